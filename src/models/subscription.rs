// src/models/subscription.rs

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::finance::{NewFinancialTransaction, NewPixCharge, PaymentMethod},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Cancelled,
    PaymentFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "billing_period", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingPeriod {
    pub fn advance(self, from: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            BillingPeriod::Weekly => return from + Duration::weeks(1),
            BillingPeriod::Monthly => 1,
            BillingPeriod::Quarterly => 3,
            BillingPeriod::Yearly => 12,
        };
        // checked_add_months só falha fora do intervalo representável
        from.checked_add_months(Months::new(months)).unwrap_or(from)
    }
}

/// Limiares de escalonamento de falhas de pagamento.
#[derive(Debug, Clone, Copy)]
pub struct FailedPaymentPolicy {
    pub payment_failed_after: i32,
    pub suspend_after: i32,
}

impl Default for FailedPaymentPolicy {
    fn default() -> Self {
        Self { payment_failed_after: 1, suspend_after: 3 }
    }
}

/// Lançamento gravado na mesma transação do novo ciclo.
#[derive(Debug, Clone)]
pub enum RenewalEntry {
    /// Pagamento na hora: receita já concluída.
    Settled(NewFinancialTransaction),
    /// PIX já emitido no provedor: cobrança + receita pendente vinculada.
    Pending { charge: NewPixCharge, income: NewFinancialTransaction },
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    #[schema(ignore)]
    pub business_id: Uuid,
    pub customer_id: Uuid,
    #[schema(example = "Plano Mensal Barba")]
    pub plan_name: String,
    #[schema(example = "89.90")]
    pub amount: Decimal,
    pub billing_period: BillingPeriod,
    pub status: SubscriptionStatus,
    pub next_billing_date: DateTime<Utc>,
    pub failed_payments_count: i32,
    pub last_payment_method: Option<PaymentMethod>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    fn ensure_not_cancelled(&self) -> Result<(), AppError> {
        if self.status == SubscriptionStatus::Cancelled {
            return Err(AppError::InvalidState(format!("Assinatura {} está cancelada", self.id)));
        }
        Ok(())
    }

    /// Renovação otimista: aplica o novo ciclo na hora, a confirmação
    /// do pagamento chega depois (webhook) para métodos assíncronos.
    pub fn renewed(&self, now: DateTime<Utc>, method: PaymentMethod) -> Result<Subscription, AppError> {
        self.ensure_not_cancelled()?;
        let mut next = self.clone();
        next.next_billing_date = self.billing_period.advance(now);
        next.status = SubscriptionStatus::Active;
        next.failed_payments_count = 0;
        next.last_payment_method = Some(method);
        next.updated_at = now;
        Ok(next)
    }

    pub fn cancelled(&self, now: DateTime<Utc>) -> Result<Subscription, AppError> {
        self.ensure_not_cancelled()?;
        let mut next = self.clone();
        next.status = SubscriptionStatus::Cancelled;
        next.cancelled_at = Some(now);
        next.updated_at = now;
        Ok(next)
    }

    pub fn with_failed_payment(&self, policy: FailedPaymentPolicy, now: DateTime<Utc>) -> Result<Subscription, AppError> {
        self.ensure_not_cancelled()?;
        let mut next = self.clone();
        next.failed_payments_count += 1;
        next.status = if next.failed_payments_count >= policy.suspend_after {
            SubscriptionStatus::Suspended
        } else if next.failed_payments_count >= policy.payment_failed_after {
            SubscriptionStatus::PaymentFailed
        } else {
            self.status
        };
        next.updated_at = now;
        Ok(next)
    }

    /// Pagamento confirmado pelo provedor (webhook). Zera as falhas e tira
    /// do estado de falha; suspensa ou cancelada não são reativadas aqui.
    pub fn with_confirmed_payment(&self, now: DateTime<Utc>) -> Subscription {
        let mut next = self.clone();
        next.failed_payments_count = 0;
        if next.status == SubscriptionStatus::PaymentFailed {
            next.status = SubscriptionStatus::Active;
        }
        next.updated_at = now;
        next
    }
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub customer_id: Uuid,
    pub plan_name: String,
    pub amount: Decimal,
    pub billing_period: BillingPeriod,
    pub next_billing_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn subscription(status: SubscriptionStatus) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            plan_name: "Mensal".into(),
            amount: Decimal::from(90),
            billing_period: BillingPeriod::Monthly,
            status,
            next_billing_date: now,
            failed_payments_count: 0,
            last_payment_method: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn monthly_period_respects_calendar() {
        let jan31 = Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap();
        let next = BillingPeriod::Monthly.advance(jan31);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 28, 12, 0, 0).unwrap());
        assert_eq!(BillingPeriod::Weekly.advance(jan31), jan31 + Duration::days(7));
    }

    #[test]
    fn failures_escalate_then_renewal_resets() {
        let policy = FailedPaymentPolicy::default();
        let now = Utc::now();
        let once = subscription(SubscriptionStatus::Active).with_failed_payment(policy, now).unwrap();
        assert_eq!(once.status, SubscriptionStatus::PaymentFailed);
        let twice = once.with_failed_payment(policy, now).unwrap();
        assert_eq!(twice.status, SubscriptionStatus::PaymentFailed);
        let thrice = twice.with_failed_payment(policy, now).unwrap();
        assert_eq!(thrice.status, SubscriptionStatus::Suspended);
        assert_eq!(thrice.failed_payments_count, 3);

        let renewed = thrice.renewed(now, PaymentMethod::Cash).unwrap();
        assert_eq!(renewed.status, SubscriptionStatus::Active);
        assert_eq!(renewed.failed_payments_count, 0);
        assert_eq!(renewed.next_billing_date, BillingPeriod::Monthly.advance(now));
    }

    #[test]
    fn cancelled_is_terminal() {
        let now = Utc::now();
        let cancelled = subscription(SubscriptionStatus::Active).cancelled(now).unwrap();
        assert!(cancelled.renewed(now, PaymentMethod::Pix).is_err());
        assert!(cancelled.cancelled(now).is_err());
        assert!(cancelled.with_failed_payment(FailedPaymentPolicy::default(), now).is_err());
    }

    #[test]
    fn confirmed_payment_reactivates_only_failed_state() {
        let now = Utc::now();
        let mut failed = subscription(SubscriptionStatus::PaymentFailed);
        failed.failed_payments_count = 2;
        let ok = failed.with_confirmed_payment(now);
        assert_eq!(ok.status, SubscriptionStatus::Active);
        assert_eq!(ok.failed_payments_count, 0);
        let suspended = subscription(SubscriptionStatus::Suspended).with_confirmed_payment(now);
        assert_eq!(suspended.status, SubscriptionStatus::Suspended);
    }
}
