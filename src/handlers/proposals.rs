// src/handlers/proposals.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::proposal::{Proposal, ProposalDraft, ScheduleOutcome},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePayload {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

// POST /api/proposals
#[utoipa::path(
    post,
    path = "/api/proposals",
    tag = "Proposals",
    request_body = ProposalDraft,
    responses(
        (status = 201, description = "Proposta criada em rascunho", body = Proposal),
        (status = 422, description = "Percentuais ou linhas inválidos")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<ProposalDraft>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let proposal = app_state.proposal_service.create(&principal, payload).await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

// GET /api/proposals
#[utoipa::path(
    get,
    path = "/api/proposals",
    tag = "Proposals",
    responses(
        (status = 200, description = "Propostas do negócio", body = Vec<Proposal>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_proposals(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let proposals = app_state.proposal_service.list(&principal).await?;
    Ok((StatusCode::OK, Json(proposals)))
}

// GET /api/proposals/{proposal_id}
#[utoipa::path(
    get,
    path = "/api/proposals/{proposal_id}",
    tag = "Proposals",
    responses(
        (status = 200, description = "Proposta", body = Proposal)
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = app_state.proposal_service.find(&principal, proposal_id).await?;
    Ok((StatusCode::OK, Json(proposal)))
}

// POST /api/proposals/{proposal_id}/send
#[utoipa::path(
    post,
    path = "/api/proposals/{proposal_id}/send",
    tag = "Proposals",
    responses(
        (status = 200, description = "Proposta enviada ao cliente", body = Proposal),
        (status = 409, description = "Status não permite envio ou reenvio dentro do intervalo mínimo"),
        (status = 502, description = "Falha no provedor de mensagens")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn send_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = app_state.proposal_service.send(&principal, proposal_id).await?;
    Ok((StatusCode::OK, Json(proposal)))
}

// POST /api/proposals/{proposal_id}/view
#[utoipa::path(
    post,
    path = "/api/proposals/{proposal_id}/view",
    tag = "Proposals",
    responses(
        (status = 200, description = "Proposta marcada como visualizada", body = Proposal),
        (status = 409, description = "Transição não permitida")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_viewed(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = app_state.proposal_service.mark_viewed(&principal, proposal_id).await?;
    Ok((StatusCode::OK, Json(proposal)))
}

// POST /api/proposals/{proposal_id}/accept
#[utoipa::path(
    post,
    path = "/api/proposals/{proposal_id}/accept",
    tag = "Proposals",
    responses(
        (status = 200, description = "Proposta aceita", body = Proposal),
        (status = 409, description = "Transição não permitida")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn accept_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = app_state.proposal_service.accept(&principal, proposal_id).await?;
    Ok((StatusCode::OK, Json(proposal)))
}

// POST /api/proposals/{proposal_id}/confirm
#[utoipa::path(
    post,
    path = "/api/proposals/{proposal_id}/confirm",
    tag = "Proposals",
    responses(
        (status = 200, description = "Proposta confirmada", body = Proposal),
        (status = 409, description = "Transição não permitida")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn confirm_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = app_state.proposal_service.confirm(&principal, proposal_id).await?;
    Ok((StatusCode::OK, Json(proposal)))
}

// POST /api/proposals/{proposal_id}/reject
#[utoipa::path(
    post,
    path = "/api/proposals/{proposal_id}/reject",
    tag = "Proposals",
    responses(
        (status = 200, description = "Proposta recusada", body = Proposal),
        (status = 409, description = "Transição não permitida")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn reject_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = app_state.proposal_service.reject(&principal, proposal_id).await?;
    Ok((StatusCode::OK, Json(proposal)))
}

// POST /api/proposals/{proposal_id}/pause
#[utoipa::path(
    post,
    path = "/api/proposals/{proposal_id}/pause",
    tag = "Proposals",
    responses(
        (status = 200, description = "Proposta pausada", body = Proposal),
        (status = 409, description = "Transição não permitida")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn pause_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = app_state.proposal_service.pause(&principal, proposal_id).await?;
    Ok((StatusCode::OK, Json(proposal)))
}

// POST /api/proposals/{proposal_id}/resume
#[utoipa::path(
    post,
    path = "/api/proposals/{proposal_id}/resume",
    tag = "Proposals",
    responses(
        (status = 200, description = "Proposta retomada", body = Proposal),
        (status = 409, description = "Transição não permitida")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn resume_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = app_state.proposal_service.resume(&principal, proposal_id).await?;
    Ok((StatusCode::OK, Json(proposal)))
}

// POST /api/proposals/{proposal_id}/cancel
#[utoipa::path(
    post,
    path = "/api/proposals/{proposal_id}/cancel",
    tag = "Proposals",
    responses(
        (status = 200, description = "Proposta cancelada", body = Proposal),
        (status = 409, description = "Transição não permitida")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn cancel_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = app_state.proposal_service.cancel(&principal, proposal_id).await?;
    Ok((StatusCode::OK, Json(proposal)))
}

// POST /api/proposals/expire-overdue
#[utoipa::path(
    post,
    path = "/api/proposals/expire-overdue",
    tag = "Proposals",
    responses(
        (status = 200, description = "Propostas que passaram para expirada", body = Vec<Proposal>)
    ),
    security(("api_jwt" = []))
)]
pub async fn expire_overdue(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let expired = app_state.proposal_service.expire_overdue(&principal, Utc::now()).await?;
    Ok((StatusCode::OK, Json(expired)))
}

// POST /api/proposals/{proposal_id}/schedule
#[utoipa::path(
    post,
    path = "/api/proposals/{proposal_id}/schedule",
    tag = "Proposals",
    request_body = SchedulePayload,
    responses(
        (status = 201, description = "Agendamento criado a partir da proposta", body = ScheduleOutcome),
        (status = 200, description = "Agendamento já existia", body = ScheduleOutcome),
        (status = 409, description = "Proposta ainda não aceita")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn schedule_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
    Json(payload): Json<SchedulePayload>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = app_state
        .proposal_service
        .schedule_from_proposal(&principal, proposal_id, payload.start_at, payload.end_at)
        .await?;

    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(outcome)))
}

// DELETE /api/proposals/{proposal_id}
#[utoipa::path(
    delete,
    path = "/api/proposals/{proposal_id}",
    tag = "Proposals",
    responses(
        (status = 204, description = "Proposta removida"),
        (status = 409, description = "Proposta com agendamento vinculado")
    ),
    params(
        ("proposal_id" = Uuid, Path, description = "ID da Proposta")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_proposal(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.proposal_service.delete(&principal, proposal_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
