// src/handlers/payments.rs

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::finance::{PixCharge, PixWebhookEvent, WebhookOutcome},
};

pub const SIGNATURE_HEADER: &str = "x-signature";

// POST /api/payments/webhook (público, autenticado pela assinatura HMAC)
#[utoipa::path(
    post,
    path = "/api/payments/webhook",
    tag = "Payments",
    request_body = PixWebhookEvent,
    responses(
        (status = 200, description = "Evento processado (applied = false se repetido)", body = WebhookOutcome),
        (status = 401, description = "Assinatura inválida"),
        (status = 404, description = "Cobrança desconhecida")
    )
)]
pub async fn pix_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    // A assinatura é sobre os bytes crus, antes de qualquer parse
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    app_state.payment_service.verify_signature(&body, signature)?;

    let event: PixWebhookEvent =
        serde_json::from_slice(&body).map_err(|e| AppError::MalformedPayload(e.to_string()))?;
    let outcome = app_state.payment_service.handle_webhook(event).await?;
    Ok((StatusCode::OK, Json(outcome)))
}

// GET /api/payments/charges/{charge_id}
#[utoipa::path(
    get,
    path = "/api/payments/charges/{charge_id}",
    tag = "Payments",
    responses(
        (status = 200, description = "Cobrança PIX", body = PixCharge)
    ),
    params(
        ("charge_id" = Uuid, Path, description = "ID da Cobrança")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_charge(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(charge_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let charge = app_state.payment_service.find_charge(&principal, charge_id).await?;
    Ok((StatusCode::OK, Json(charge)))
}

// POST /api/payments/charges/{charge_id}/reminder
#[utoipa::path(
    post,
    path = "/api/payments/charges/{charge_id}/reminder",
    tag = "Payments",
    responses(
        (status = 200, description = "Lembrete enviado", body = PixCharge),
        (status = 409, description = "Cobrança não está pendente")
    ),
    params(
        ("charge_id" = Uuid, Path, description = "ID da Cobrança")
    ),
    security(("api_jwt" = []))
)]
pub async fn send_reminder(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(charge_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let charge = app_state.payment_service.send_charge_reminder(&principal, charge_id).await?;
    Ok((StatusCode::OK, Json(charge)))
}

// POST /api/payments/charges/expire-overdue
#[utoipa::path(
    post,
    path = "/api/payments/charges/expire-overdue",
    tag = "Payments",
    responses(
        (status = 200, description = "Cobranças vencidas marcadas como expiradas", body = Vec<PixCharge>)
    ),
    security(("api_jwt" = []))
)]
pub async fn expire_overdue_charges(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let expired = app_state.payment_service.expire_overdue_charges(&principal, Utc::now()).await?;
    Ok((StatusCode::OK, Json(expired)))
}
