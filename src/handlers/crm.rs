// src/handlers/crm.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        crm::{Customer, NewCustomer},
        loyalty::{LoyaltyCard, VisitOutcome},
    },
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerPayload {
    #[validate(length(min = 1, message = "O nome é obrigatório."))]
    pub name: String,
    #[validate(email(message = "E-mail inválido."))]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 20, message = "Telefone inválido."))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StampsRequiredPayload {
    #[validate(range(min = 1, message = "A meta deve ser pelo menos 1."))]
    pub stamps_required: i32,
}

// POST /api/crm/customers
#[utoipa::path(
    post,
    path = "/api/crm/customers",
    tag = "CRM",
    request_body = CreateCustomerPayload,
    responses(
        (status = 201, description = "Cliente criado", body = Customer)
    ),
    security(("api_jwt" = []))
)]
pub async fn create_customer(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<CreateCustomerPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let customer = app_state
        .crm_service
        .create_customer(
            &principal,
            NewCustomer { name: payload.name, email: payload.email, phone: payload.phone },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(customer)))
}

// GET /api/crm/customers/{customer_id}
#[utoipa::path(
    get,
    path = "/api/crm/customers/{customer_id}",
    tag = "CRM",
    responses(
        (status = 200, description = "Cliente", body = Customer),
        (status = 403, description = "Cliente de outro negócio")
    ),
    params(
        ("customer_id" = Uuid, Path, description = "ID do Cliente")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_customer(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let customer = app_state.crm_service.find_customer(&principal, customer_id).await?;
    Ok((StatusCode::OK, Json(customer)))
}

// GET /api/crm/customers/{customer_id}/loyalty
#[utoipa::path(
    get,
    path = "/api/crm/customers/{customer_id}/loyalty",
    tag = "Loyalty",
    responses(
        (status = 200, description = "Cartão fidelidade (null se ainda não existe)", body = Option<LoyaltyCard>),
        (status = 403, description = "Cliente de outro negócio"),
        (status = 404, description = "Cliente não encontrado")
    ),
    params(
        ("customer_id" = Uuid, Path, description = "ID do Cliente")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_loyalty_card(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let card = app_state.loyalty_service.card(&principal, customer_id).await?;
    Ok((StatusCode::OK, Json(card)))
}

// PUT /api/crm/customers/{customer_id}/loyalty/stamps-required
#[utoipa::path(
    put,
    path = "/api/crm/customers/{customer_id}/loyalty/stamps-required",
    tag = "Loyalty",
    request_body = StampsRequiredPayload,
    responses(
        (status = 200, description = "Meta alterada", body = VisitOutcome),
        (status = 403, description = "Cliente de outro negócio"),
        (status = 404, description = "Cliente não encontrado")
    ),
    params(
        ("customer_id" = Uuid, Path, description = "ID do Cliente")
    ),
    security(("api_jwt" = []))
)]
pub async fn set_stamps_required(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<StampsRequiredPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let outcome = app_state
        .loyalty_service
        .set_stamps_required(&principal, customer_id, payload.stamps_required)
        .await?;
    Ok((StatusCode::OK, Json(outcome)))
}
