// src/db/inventory_repo.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ensure_owner,
    models::inventory::{InventoryItem, NewInventoryItem, NewStockMovement, StockMovement},
};

/// Porta do estoque. `apply_movement` é a única forma de mudar o saldo e
/// precisa ser serializada por item (lock de linha ou equivalente).
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn create_item(&self, owner: Uuid, item: NewInventoryItem) -> Result<InventoryItem, AppError>;

    async fn find_item(&self, owner: Uuid, item_id: Uuid) -> Result<InventoryItem, AppError>;

    async fn list_items(&self, owner: Uuid) -> Result<Vec<InventoryItem>, AppError>;

    async fn apply_movement(&self, owner: Uuid, movement: NewStockMovement) -> Result<StockMovement, AppError>;

    /// Histórico em ordem de aplicação.
    async fn list_movements(&self, owner: Uuid, item_id: Uuid) -> Result<Vec<StockMovement>, AppError>;
}

#[derive(Clone)]
pub struct PgInventoryRepository {
    pool: PgPool,
}

impl PgInventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryRepository for PgInventoryRepository {
    async fn create_item(&self, owner: Uuid, item: NewInventoryItem) -> Result<InventoryItem, AppError> {
        sqlx::query_as::<_, InventoryItem>(
            r#"
            INSERT INTO inventory_items (business_id, name, unit, current_stock, minimum_stock, cost_price, sale_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
            .bind(owner)
            .bind(&item.name)
            .bind(&item.unit)
            .bind(item.initial_stock)
            .bind(item.minimum_stock)
            .bind(item.cost_price)
            .bind(item.sale_price)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::from_storage(e, "Item de estoque"))
    }

    async fn find_item(&self, owner: Uuid, item_id: Uuid) -> Result<InventoryItem, AppError> {
        let item = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Item de estoque", item_id))?;

        ensure_owner("Item de estoque", item_id, item.business_id, owner)?;
        Ok(item)
    }

    async fn list_items(&self, owner: Uuid) -> Result<Vec<InventoryItem>, AppError> {
        let items = sqlx::query_as::<_, InventoryItem>(
            "SELECT * FROM inventory_items WHERE business_id = $1 ORDER BY name ASC",
        )
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn apply_movement(&self, owner: Uuid, movement: NewStockMovement) -> Result<StockMovement, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Trava a linha do item: duas baixas simultâneas não leem o mesmo saldo
        let item = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = $1 FOR UPDATE")
            .bind(movement.item_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Item de estoque", movement.item_id))?;

        ensure_owner("Item de estoque", item.id, item.business_id, owner)?;

        // 2. Calcula o novo saldo (regra no model)
        let new_stock = movement.movement_type.next_stock(item.current_stock, movement.quantity)?;

        // 3. Grava o Histórico
        let (reference_type, reference_id) = match &movement.reference {
            Some(r) => (Some(r.reference_type.as_str()), Some(r.reference_id)),
            None => (None, None),
        };

        let recorded = sqlx::query_as::<_, StockMovement>(
            r#"
            INSERT INTO stock_movements (
                business_id, item_id, movement_type, quantity,
                previous_stock, new_stock, reason, reference_type, reference_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
            .bind(owner)
            .bind(item.id)
            .bind(movement.movement_type)
            .bind(movement.quantity)
            .bind(item.current_stock)
            .bind(new_stock)
            .bind(movement.reason.as_deref())
            .bind(reference_type)
            .bind(reference_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::from_storage(e, "Movimentação de estoque"))?;

        // 4. Atualiza o saldo do item
        sqlx::query("UPDATE inventory_items SET current_stock = $1, updated_at = $2 WHERE id = $3")
            .bind(new_stock)
            .bind(Utc::now())
            .bind(item.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(recorded)
    }

    async fn list_movements(&self, owner: Uuid, item_id: Uuid) -> Result<Vec<StockMovement>, AppError> {
        // Garante existência e dono antes de listar
        self.find_item(owner, item_id).await?;

        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT * FROM stock_movements
            WHERE business_id = $1 AND item_id = $2
            ORDER BY seq ASC
            "#,
        )
            .bind(owner)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }
}
