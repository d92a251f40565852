// src/handlers/subscriptions.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
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
        finance::{FinancialTransaction, PaymentMethod},
        subscription::{BillingPeriod, Subscription},
    },
    services::subscription_service::RenewalOutcome,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionPayload {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "O nome do plano é obrigatório."))]
    pub plan_name: String,
    #[schema(example = "89.90")]
    pub amount: Decimal,
    pub billing_period: BillingPeriod,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenewPayload {
    pub payment_method: PaymentMethod,
}

// POST /api/subscriptions
#[utoipa::path(
    post,
    path = "/api/subscriptions",
    tag = "Subscriptions",
    request_body = CreateSubscriptionPayload,
    responses(
        (status = 201, description = "Assinatura criada", body = Subscription),
        (status = 422, description = "Valor inválido")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_subscription(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<CreateSubscriptionPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let subscription = app_state
        .subscription_service
        .create(
            &principal,
            payload.customer_id,
            payload.plan_name.trim().to_string(),
            payload.amount,
            payload.billing_period,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

// GET /api/subscriptions/{subscription_id}
#[utoipa::path(
    get,
    path = "/api/subscriptions/{subscription_id}",
    tag = "Subscriptions",
    responses(
        (status = 200, description = "Assinatura", body = Subscription)
    ),
    params(
        ("subscription_id" = Uuid, Path, description = "ID da Assinatura")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_subscription(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = app_state.subscription_service.find(&principal, subscription_id).await?;
    Ok((StatusCode::OK, Json(subscription)))
}

// POST /api/subscriptions/{subscription_id}/renew
#[utoipa::path(
    post,
    path = "/api/subscriptions/{subscription_id}/renew",
    tag = "Subscriptions",
    request_body = RenewPayload,
    responses(
        (status = 200, description = "Assinatura renovada (PIX traz a cobrança pendente)", body = RenewalOutcome),
        (status = 409, description = "Assinatura cancelada"),
        (status = 502, description = "Provedor de pagamento indisponível")
    ),
    params(
        ("subscription_id" = Uuid, Path, description = "ID da Assinatura")
    ),
    security(("api_jwt" = []))
)]
pub async fn renew_subscription(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(subscription_id): Path<Uuid>,
    Json(payload): Json<RenewPayload>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = app_state
        .subscription_service
        .renew(&principal, subscription_id, payload.payment_method)
        .await?;
    Ok((StatusCode::OK, Json(outcome)))
}

// POST /api/subscriptions/{subscription_id}/cancel
#[utoipa::path(
    post,
    path = "/api/subscriptions/{subscription_id}/cancel",
    tag = "Subscriptions",
    responses(
        (status = 200, description = "Assinatura cancelada", body = Subscription),
        (status = 409, description = "Já cancelada")
    ),
    params(
        ("subscription_id" = Uuid, Path, description = "ID da Assinatura")
    ),
    security(("api_jwt" = []))
)]
pub async fn cancel_subscription(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = app_state.subscription_service.cancel(&principal, subscription_id).await?;
    Ok((StatusCode::OK, Json(subscription)))
}

// POST /api/subscriptions/{subscription_id}/failed-payment
#[utoipa::path(
    post,
    path = "/api/subscriptions/{subscription_id}/failed-payment",
    tag = "Subscriptions",
    responses(
        (status = 200, description = "Falha registrada e status recalculado", body = Subscription),
        (status = 409, description = "Assinatura cancelada")
    ),
    params(
        ("subscription_id" = Uuid, Path, description = "ID da Assinatura")
    ),
    security(("api_jwt" = []))
)]
pub async fn record_failed_payment(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = app_state
        .subscription_service
        .record_failed_payment(&principal, subscription_id)
        .await?;
    Ok((StatusCode::OK, Json(subscription)))
}

// GET /api/subscriptions/{subscription_id}/transactions
#[utoipa::path(
    get,
    path = "/api/subscriptions/{subscription_id}/transactions",
    tag = "Subscriptions",
    responses(
        (status = 200, description = "Lançamentos da assinatura", body = Vec<FinancialTransaction>)
    ),
    params(
        ("subscription_id" = Uuid, Path, description = "ID da Assinatura")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_transactions(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transactions = app_state.subscription_service.transactions(&principal, subscription_id).await?;
    Ok((StatusCode::OK, Json(transactions)))
}
