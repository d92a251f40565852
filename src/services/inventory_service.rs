// src/services/inventory_service.rs

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::{error::AppError, money::round_quantity},
    db::InventoryRepository,
    models::{
        auth::Principal,
        inventory::{InventoryItem, MovementReference, NewInventoryItem, NewStockMovement, StockMovement, StockMovementType},
    },
};

#[derive(Clone)]
pub struct InventoryService {
    repo: Arc<dyn InventoryRepository>,
}

impl InventoryService {
    pub fn new(repo: Arc<dyn InventoryRepository>) -> Self {
        Self { repo }
    }

    // --- CREATE ITEM ---
    pub async fn create_item(&self, principal: &Principal, item: NewInventoryItem) -> Result<InventoryItem, AppError> {
        if item.initial_stock < Decimal::ZERO || item.minimum_stock < Decimal::ZERO {
            return Err(AppError::InvalidQuantity("Estoque inicial e mínimo não podem ser negativos".to_string()));
        }
        self.repo.create_item(principal.business_id(), item).await
    }

    pub async fn find_item(&self, principal: &Principal, item_id: Uuid) -> Result<InventoryItem, AppError> {
        self.repo.find_item(principal.business_id(), item_id).await
    }

    pub async fn list_items(&self, principal: &Principal) -> Result<Vec<InventoryItem>, AppError> {
        self.repo.list_items(principal.business_id()).await
    }

    /// Aplica uma movimentação (entrada, saída ou ajuste com sinal).
    pub async fn apply_movement(
        &self,
        principal: &Principal,
        item_id: Uuid,
        quantity: Decimal,
        movement_type: StockMovementType,
        reason: Option<String>,
        reference: Option<MovementReference>,
    ) -> Result<StockMovement, AppError> {
        let quantity = round_quantity(quantity);
        let movement = self
            .repo
            .apply_movement(
                principal.business_id(),
                NewStockMovement { item_id, movement_type, quantity, reason, reference },
            )
            .await?;

        if movement.new_stock < Decimal::ZERO {
            tracing::warn!(
                item_id = %item_id,
                new_stock = %movement.new_stock,
                "Estoque ficou negativo após movimentação"
            );
        }
        Ok(movement)
    }

    pub async fn list_movements(&self, principal: &Principal, item_id: Uuid) -> Result<Vec<StockMovement>, AppError> {
        self.repo.list_movements(principal.business_id(), item_id).await
    }

    /// Varredura só de leitura: itens com mínimo configurado e saldo <= mínimo.
    pub async fn low_stock_items(&self, principal: &Principal) -> Result<Vec<InventoryItem>, AppError> {
        let items = self.repo.list_items(principal.business_id()).await?;
        Ok(items.into_iter().filter(InventoryItem::is_low_stock).collect())
    }
}
