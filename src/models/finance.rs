// src/models/finance.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use sqlx::FromRow;
use chrono::{DateTime, Utc, NaiveDate};
use rust_decimal::Decimal;
use utoipa::ToSchema;

use crate::common::error::AppError;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,  // Entrada
    Expense, // Saída
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Pix,
    CreditCard,
    DebitCard,
    BankTransfer,
}

impl PaymentMethod {
    /// Métodos assíncronos geram uma cobrança e só confirmam via webhook.
    pub fn is_asynchronous(self) -> bool {
        matches!(self, PaymentMethod::Pix)
    }
}

// --- Lançamentos Financeiros (Livro-razão) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialTransaction {
    pub id: Uuid,

    #[schema(ignore)]
    pub business_id: Uuid,

    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    #[schema(example = "150.00")]
    pub amount: Decimal,

    #[schema(example = "Atendimento: Corte + Escova")]
    pub description: String,

    pub payment_method: Option<PaymentMethod>,
    pub status: TransactionStatus,

    #[schema(value_type = String, format = Date, example = "2026-10-14")]
    pub transaction_date: NaiveDate,

    // Vínculos
    pub appointment_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub pix_charge_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFinancialTransaction {
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub payment_method: Option<PaymentMethod>,
    pub status: TransactionStatus,
    pub transaction_date: NaiveDate,
    pub appointment_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub pix_charge_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
}

impl NewFinancialTransaction {
    /// Receita já liquidada (ex: atendimento pago no balcão).
    pub fn income(amount: Decimal, description: String, payment_method: Option<PaymentMethod>, date: NaiveDate) -> Self {
        Self {
            transaction_type: TransactionType::Income,
            amount,
            description,
            payment_method,
            status: TransactionStatus::Completed,
            transaction_date: date,
            appointment_id: None,
            category_id: None,
            pix_charge_id: None,
            subscription_id: None,
        }
    }

    pub fn validate_amount(&self) -> Result<(), AppError> {
        if self.amount <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(format!(
                "Valor do lançamento deve ser positivo (recebido {})",
                self.amount
            )));
        }
        Ok(())
    }
}

// --- Cobranças PIX ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "pix_charge_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PixChargeStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

impl PixChargeStatus {
    /// Só uma cobrança pendente pode mudar de estado; paga é final.
    pub fn can_settle_to(self, next: PixChargeStatus) -> bool {
        self == PixChargeStatus::Pending && next != PixChargeStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PixCharge {
    pub id: Uuid,
    #[schema(ignore)]
    pub business_id: Uuid,
    // ID da cobrança no provedor
    pub external_id: String,
    #[schema(example = "89.90")]
    pub amount: Decimal,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub status: PixChargeStatus,
    // "Pix Copia e Cola"
    pub qr_payload: String,
    pub qr_svg: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub reminders_sent: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPixCharge {
    pub external_id: String,
    pub amount: Decimal,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub qr_payload: String,
    pub qr_svg: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub appointment_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
}

/// Callback do provedor de pagamento.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PixWebhookEvent {
    #[schema(example = "mock-subscription-8f1c")]
    pub charge_id: String,
    pub status: PixChargeStatus,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    // false: evento repetido ou tardio (cobrança já liquidada)
    pub applied: bool,
    pub charge: PixCharge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_charges_settle() {
        assert!(PixChargeStatus::Pending.can_settle_to(PixChargeStatus::Paid));
        assert!(PixChargeStatus::Pending.can_settle_to(PixChargeStatus::Expired));
        assert!(!PixChargeStatus::Pending.can_settle_to(PixChargeStatus::Pending));
        assert!(!PixChargeStatus::Paid.can_settle_to(PixChargeStatus::Expired));
        assert!(!PixChargeStatus::Expired.can_settle_to(PixChargeStatus::Paid));
    }

    #[test]
    fn income_requires_positive_amount() {
        let date = Utc::now().date_naive();
        assert!(NewFinancialTransaction::income(Decimal::ONE, "x".into(), None, date).validate_amount().is_ok());
        assert!(NewFinancialTransaction::income(Decimal::ZERO, "x".into(), None, date).validate_amount().is_err());
    }
}
