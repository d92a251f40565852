// src/handlers/appointments.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        appointment::{Appointment, CompletionReport, CompletionRequest, NewAppointment},
        finance::FinancialTransaction,
    },
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentPayload {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "O título é obrigatório."))]
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub price: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
}

// POST /api/appointments
#[utoipa::path(
    post,
    path = "/api/appointments",
    tag = "Appointments",
    request_body = CreateAppointmentPayload,
    responses(
        (status = 201, description = "Agendamento criado", body = Appointment),
        (status = 409, description = "Horário inválido")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_appointment(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<CreateAppointmentPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let appointment = app_state
        .appointment_service
        .create_appointment(
            &principal,
            NewAppointment {
                customer_id: payload.customer_id,
                title: payload.title.trim().to_string(),
                start_at: payload.start_at,
                end_at: payload.end_at,
                price: payload.price,
                deposit_amount: payload.deposit_amount,
                proposal_id: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

// GET /api/appointments/{appointment_id}
#[utoipa::path(
    get,
    path = "/api/appointments/{appointment_id}",
    tag = "Appointments",
    responses(
        (status = 200, description = "Agendamento", body = Appointment)
    ),
    params(
        ("appointment_id" = Uuid, Path, description = "ID do Agendamento")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_appointment(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(appointment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let appointment = app_state.appointment_service.find_appointment(&principal, appointment_id).await?;
    Ok((StatusCode::OK, Json(appointment)))
}

// POST /api/appointments/{appointment_id}/complete
#[utoipa::path(
    post,
    path = "/api/appointments/{appointment_id}/complete",
    tag = "Appointments",
    request_body = CompletionRequest,
    responses(
        (status = 200, description = "Atendimento finalizado (ver 'degraded' para passos que falharam)", body = CompletionReport),
        (status = 409, description = "Agendamento não está agendado"),
        (status = 422, description = "Valor negativo")
    ),
    params(
        ("appointment_id" = Uuid, Path, description = "ID do Agendamento")
    ),
    security(("api_jwt" = []))
)]
pub async fn complete_appointment(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(appointment_id): Path<Uuid>,
    Json(payload): Json<CompletionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let report = app_state
        .appointment_service
        .complete_appointment(&principal, appointment_id, payload)
        .await?;
    Ok((StatusCode::OK, Json(report)))
}

// POST /api/appointments/{appointment_id}/cancel
#[utoipa::path(
    post,
    path = "/api/appointments/{appointment_id}/cancel",
    tag = "Appointments",
    responses(
        (status = 200, description = "Agendamento cancelado", body = Appointment),
        (status = 409, description = "Agendamento já encerrado")
    ),
    params(
        ("appointment_id" = Uuid, Path, description = "ID do Agendamento")
    ),
    security(("api_jwt" = []))
)]
pub async fn cancel_appointment(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(appointment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let appointment = app_state.appointment_service.cancel_appointment(&principal, appointment_id).await?;
    Ok((StatusCode::OK, Json(appointment)))
}

// GET /api/appointments/{appointment_id}/transactions
#[utoipa::path(
    get,
    path = "/api/appointments/{appointment_id}/transactions",
    tag = "Appointments",
    responses(
        (status = 200, description = "Lançamentos ligados ao agendamento", body = Vec<FinancialTransaction>)
    ),
    params(
        ("appointment_id" = Uuid, Path, description = "ID do Agendamento")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_transactions(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(appointment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transactions = app_state.appointment_service.transactions(&principal, appointment_id).await?;
    Ok((StatusCode::OK, Json(transactions)))
}
