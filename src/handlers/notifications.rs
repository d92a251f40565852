// src/handlers/notifications.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::notification::{NotificationKey, UnseenSummary},
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnseenQuery {
    /// Dia do calendário (padrão: hoje, UTC)
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkSeenPayload {
    #[validate(length(min = 1, message = "Informe ao menos uma notificação."))]
    pub keys: Vec<NotificationKey>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkSeenResponse {
    /// Quantas marcações eram novas
    pub marked: u64,
}

// GET /api/notifications/unseen
#[utoipa::path(
    get,
    path = "/api/notifications/unseen",
    tag = "Notifications",
    params(UnseenQuery),
    responses(
        (status = 200, description = "Itens do dia ainda não vistos pelo usuário", body = UnseenSummary)
    ),
    security(("api_jwt" = []))
)]
pub async fn unseen(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(query): Query<UnseenQuery>,
) -> Result<impl IntoResponse, AppError> {
    let today = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let summary = app_state.notification_service.unseen(&principal, today).await?;
    Ok((StatusCode::OK, Json(summary)))
}

// POST /api/notifications/seen
#[utoipa::path(
    post,
    path = "/api/notifications/seen",
    tag = "Notifications",
    request_body = MarkSeenPayload,
    responses(
        (status = 200, description = "Marcações registradas", body = MarkSeenResponse)
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_seen(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<MarkSeenPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let marked = app_state.notification_service.mark_seen(&principal, &payload.keys).await?;
    Ok((StatusCode::OK, Json(MarkSeenResponse { marked })))
}
