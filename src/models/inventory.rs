// src/models/inventory.rs

use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::{error::AppError, money::overflow};

// --- 1. Itens de Estoque ---
// current_stock só muda através de uma movimentação (ver InventoryRepository::apply_movement).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: Uuid,
    #[schema(ignore)]
    pub business_id: Uuid,
    #[schema(example = "Esmalte vermelho")]
    pub name: String,
    #[schema(example = "un")]
    pub unit: String,
    #[schema(example = "12.0")]
    pub current_stock: Decimal,
    #[schema(example = "3.0")]
    pub minimum_stock: Decimal,
    pub cost_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Estoque baixo só faz sentido quando um mínimo foi configurado.
    pub fn is_low_stock(&self) -> bool {
        self.minimum_stock > Decimal::ZERO && self.current_stock <= self.minimum_stock
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    pub unit: String,
    pub initial_stock: Decimal,
    pub minimum_stock: Decimal,
    pub cost_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
}

// --- 2. Movimentações de Estoque ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "stock_movement_type", rename_all = "snake_case")] // Banco
#[serde(rename_all = "snake_case")] // JSON
pub enum StockMovementType {
    In,         // Entrada: soma
    Out,        // Saída: subtrai
    Adjustment, // Ajuste: delta com sinal, como informado
}

impl StockMovementType {
    /// Calcula o novo saldo a partir do saldo anterior.
    /// Saldo negativo é tolerado: uma baixa com cadastro de estoque errado
    /// não pode travar a finalização do atendimento.
    pub fn next_stock(self, previous: Decimal, quantity: Decimal) -> Result<Decimal, AppError> {
        let next = match self {
            StockMovementType::In | StockMovementType::Out if quantity <= Decimal::ZERO => {
                return Err(AppError::InvalidQuantity(format!(
                    "Quantidade deve ser positiva para entrada/saída (recebido {})",
                    quantity
                )));
            }
            StockMovementType::Adjustment if quantity.is_zero() => {
                return Err(AppError::InvalidQuantity("Ajuste de estoque com quantidade zero".to_string()));
            }
            StockMovementType::In | StockMovementType::Adjustment => previous.checked_add(quantity),
            StockMovementType::Out => previous.checked_sub(quantity),
        };
        next.ok_or_else(|| overflow("Saldo de estoque"))
    }
}

/// Quem causou a movimentação (ex: "appointment", id do agendamento).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovementReference {
    #[schema(example = "appointment")]
    pub reference_type: String,
    pub reference_id: Uuid,
}

impl MovementReference {
    pub fn appointment(id: Uuid) -> Self {
        Self { reference_type: "appointment".to_string(), reference_id: id }
    }
}

#[derive(Debug, Clone)]
pub struct NewStockMovement {
    pub item_id: Uuid,
    pub movement_type: StockMovementType,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub reference: Option<MovementReference>,
}

// --- STOCK MOVEMENT (Histórico imutável) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    #[schema(ignore)]
    pub business_id: Uuid,
    pub item_id: Uuid,
    pub movement_type: StockMovementType,
    pub quantity: Decimal,
    pub previous_stock: Decimal,
    pub new_stock: Decimal,
    pub reason: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StockMovementType::In, 10, 3, 13)]
    #[case(StockMovementType::Out, 10, 3, 7)]
    #[case(StockMovementType::Out, 1, 3, -2)]
    #[case(StockMovementType::Adjustment, 10, -4, 6)]
    #[case(StockMovementType::Adjustment, 10, 5, 15)]
    fn next_stock_applies_signed_delta(
        #[case] kind: StockMovementType,
        #[case] previous: i64,
        #[case] quantity: i64,
        #[case] expected: i64,
    ) {
        let next = kind.next_stock(Decimal::from(previous), Decimal::from(quantity)).unwrap();
        assert_eq!(next, Decimal::from(expected));
    }

    #[rstest]
    #[case(StockMovementType::In, 0)]
    #[case(StockMovementType::Out, -1)]
    #[case(StockMovementType::Adjustment, 0)]
    fn next_stock_rejects_invalid_quantities(#[case] kind: StockMovementType, #[case] quantity: i64) {
        let err = kind.next_stock(Decimal::TEN, Decimal::from(quantity)).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuantity(_)));
    }

    #[test]
    fn next_stock_overflow_is_invalid_quantity() {
        let err = StockMovementType::In.next_stock(Decimal::MAX, Decimal::ONE).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuantity(_)));
        let err = StockMovementType::Out.next_stock(Decimal::MIN, Decimal::ONE).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuantity(_)));
    }

    #[test]
    fn low_stock_requires_configured_minimum() {
        let now = Utc::now();
        let mut item = InventoryItem {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            name: "Luva".into(),
            unit: "par".into(),
            current_stock: Decimal::ZERO,
            minimum_stock: Decimal::ZERO,
            cost_price: None,
            sale_price: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!item.is_low_stock());
        item.minimum_stock = Decimal::from(2);
        assert!(item.is_low_stock());
        item.current_stock = Decimal::from(3);
        assert!(!item.is_low_stock());
    }
}
