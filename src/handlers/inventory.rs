// src/handlers/inventory.rs

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
use validator::{Validate, ValidationError};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::inventory::{InventoryItem, MovementReference, NewInventoryItem, StockMovement, StockMovementType},
};

fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemPayload {
    #[validate(length(min = 1, message = "O nome é obrigatório."))]
    pub name: String,

    #[validate(length(min = 1, message = "A unidade é obrigatória."))]
    pub unit: String,

    #[validate(custom(function = "validate_not_negative"))]
    #[serde(default)]
    pub initial_stock: Decimal,

    #[validate(custom(function = "validate_not_negative"))]
    #[serde(default)]
    pub minimum_stock: Decimal,

    pub cost_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockMovementPayload {
    pub movement_type: StockMovementType,
    // Para ajuste é um delta com sinal
    pub quantity: Decimal,
    #[validate(length(max = 255))]
    pub reason: Option<String>,
    pub reference: Option<MovementReference>,
}

// POST /api/inventory/items
#[utoipa::path(
    post,
    path = "/api/inventory/items",
    tag = "Inventory",
    request_body = CreateItemPayload,
    responses(
        (status = 201, description = "Item criado", body = InventoryItem)
    ),
    security(("api_jwt" = []))
)]
pub async fn create_item(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(payload): Json<CreateItemPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let item = app_state
        .inventory_service
        .create_item(
            &principal,
            NewInventoryItem {
                name: payload.name,
                unit: payload.unit,
                initial_stock: payload.initial_stock,
                minimum_stock: payload.minimum_stock,
                cost_price: payload.cost_price,
                sale_price: payload.sale_price,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

// GET /api/inventory/items
#[utoipa::path(
    get,
    path = "/api/inventory/items",
    tag = "Inventory",
    responses(
        (status = 200, description = "Itens do estoque", body = Vec<InventoryItem>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_items(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let items = app_state.inventory_service.list_items(&principal).await?;
    Ok((StatusCode::OK, Json(items)))
}

// GET /api/inventory/items/low-stock
#[utoipa::path(
    get,
    path = "/api/inventory/items/low-stock",
    tag = "Inventory",
    responses(
        (status = 200, description = "Itens no ou abaixo do mínimo", body = Vec<InventoryItem>)
    ),
    security(("api_jwt" = []))
)]
pub async fn low_stock_items(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let items = app_state.inventory_service.low_stock_items(&principal).await?;
    Ok((StatusCode::OK, Json(items)))
}

// POST /api/inventory/items/{item_id}/movements
#[utoipa::path(
    post,
    path = "/api/inventory/items/{item_id}/movements",
    tag = "Inventory",
    request_body = StockMovementPayload,
    responses(
        (status = 201, description = "Movimentação aplicada", body = StockMovement),
        (status = 422, description = "Quantidade inválida")
    ),
    params(
        ("item_id" = Uuid, Path, description = "ID do Item")
    ),
    security(("api_jwt" = []))
)]
pub async fn apply_movement(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<StockMovementPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let movement = app_state
        .inventory_service
        .apply_movement(
            &principal,
            item_id,
            payload.quantity,
            payload.movement_type,
            payload.reason,
            payload.reference,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(movement)))
}

// GET /api/inventory/items/{item_id}/movements
#[utoipa::path(
    get,
    path = "/api/inventory/items/{item_id}/movements",
    tag = "Inventory",
    responses(
        (status = 200, description = "Histórico em ordem de aplicação", body = Vec<StockMovement>)
    ),
    params(
        ("item_id" = Uuid, Path, description = "ID do Item")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_movements(
    State(app_state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let movements = app_state.inventory_service.list_movements(&principal, item_id).await?;
    Ok((StatusCode::OK, Json(movements)))
}
