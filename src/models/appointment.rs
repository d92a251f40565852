// src/models/appointment.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        finance::{FinancialTransaction, PaymentMethod},
        inventory::StockMovement,
        loyalty::LoyaltyCard,
    },
};

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "appointment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AppointmentStatus::Scheduled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "appointment_payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppointmentPaymentStatus {
    Pending,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    #[schema(ignore)]
    pub business_id: Uuid,
    pub customer_id: Option<Uuid>,
    #[schema(example = "Corte + Escova")]
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub payment_status: AppointmentPaymentStatus,
    #[schema(example = "150.00")]
    pub price: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub proposal_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Falha rápido se o agendamento já saiu de "scheduled".
    pub fn ensure_scheduled(&self) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Agendamento {} já está {:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub customer_id: Option<Uuid>,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub price: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
    pub proposal_id: Option<Uuid>,
}

impl NewAppointment {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.end_at <= self.start_at {
            return Err(AppError::InvalidState(
                "O término do agendamento deve ser posterior ao início".to_string(),
            ));
        }
        if let Some(price) = self.price {
            if price < Decimal::ZERO {
                return Err(AppError::InvalidQuantity(format!("Preço negativo: {}", price)));
            }
        }
        if let Some(deposit) = self.deposit_amount {
            if deposit < Decimal::ZERO {
                return Err(AppError::InvalidQuantity(format!("Sinal negativo: {}", deposit)));
            }
        }
        Ok(())
    }
}

// --- Finalização ---

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockUsage {
    pub item_id: Uuid,
    #[schema(example = "2.0")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    #[schema(example = "150.00")]
    pub value: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub stock_usages: Vec<StockUsage>,
}

/// O que o repositório grava na mesma transação da mudança de status.
#[derive(Debug, Clone)]
pub struct CompletionUpdate {
    pub price: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSignal {
    Completed,
    RewardEarned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DegradedStepKind {
    Stock,
    Loyalty,
    Notification,
    Task,
}

/// Efeito colateral secundário que falhou sem desfazer a finalização.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DegradedStep {
    pub step: DegradedStepKind,
    pub reference_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub appointment: Appointment,
    pub transaction: Option<FinancialTransaction>,
    pub movements: Vec<StockMovement>,
    pub loyalty: Option<LoyaltyCard>,
    pub signal: CompletionSignal,
    pub degraded: Vec<DegradedStep>,
}

impl CompletionReport {
    pub fn is_partial(&self) -> bool {
        !self.degraded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn end_must_follow_start() {
        let start = Utc::now();
        let mut new = NewAppointment {
            customer_id: None,
            title: "Barba".into(),
            start_at: start,
            end_at: start,
            price: None,
            deposit_amount: None,
            proposal_id: None,
        };
        assert!(matches!(new.validate(), Err(AppError::InvalidState(_))));
        new.end_at = start + Duration::minutes(30);
        assert!(new.validate().is_ok());
    }

    #[test]
    fn negative_price_or_deposit_is_rejected() {
        let start = Utc::now();
        let mut new = NewAppointment {
            customer_id: None,
            title: "Corte".into(),
            start_at: start,
            end_at: start + Duration::minutes(45),
            price: Some(Decimal::from(80)),
            deposit_amount: Some(Decimal::from(-10)),
            proposal_id: None,
        };
        assert!(matches!(new.validate(), Err(AppError::InvalidQuantity(_))));
        new.deposit_amount = Some(Decimal::ZERO);
        assert!(new.validate().is_ok());
        new.price = Some(Decimal::from(-1));
        assert!(matches!(new.validate(), Err(AppError::InvalidQuantity(_))));
    }

    #[test]
    fn terminal_states() {
        assert!(!AppointmentStatus::Scheduled.is_terminal());
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
    }
}
