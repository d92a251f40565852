// src/services/subscription_service.rs

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CustomerRepository, FinanceRepository, SubscriptionRepository},
    models::{
        auth::Principal,
        finance::{FinancialTransaction, NewFinancialTransaction, PaymentMethod, PixCharge},
        subscription::{BillingPeriod, FailedPaymentPolicy, NewSubscription, RenewalEntry, Subscription},
    },
    services::payment_service::PaymentService,
};

/// Resultado da renovação: a assinatura já renovada, o lançamento e, no PIX,
/// a cobrança que o cliente ainda precisa pagar.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenewalOutcome {
    pub subscription: Subscription,
    pub transaction: Option<FinancialTransaction>,
    pub pix_charge: Option<PixCharge>,
}

#[derive(Clone)]
pub struct SubscriptionService {
    repo: Arc<dyn SubscriptionRepository>,
    customers: Arc<dyn CustomerRepository>,
    finance: Arc<dyn FinanceRepository>,
    payments: PaymentService,
    policy: FailedPaymentPolicy,
}

impl SubscriptionService {
    pub fn new(
        repo: Arc<dyn SubscriptionRepository>,
        customers: Arc<dyn CustomerRepository>,
        finance: Arc<dyn FinanceRepository>,
        payments: PaymentService,
        policy: FailedPaymentPolicy,
    ) -> Self {
        Self { repo, customers, finance, payments, policy }
    }

    pub async fn create(
        &self,
        principal: &Principal,
        customer_id: Uuid,
        plan_name: String,
        amount: Decimal,
        billing_period: BillingPeriod,
    ) -> Result<Subscription, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(format!("Valor da assinatura deve ser positivo (recebido {})", amount)));
        }
        let owner = principal.business_id();
        self.customers.find(owner, customer_id).await?;

        let subscription = NewSubscription {
            customer_id,
            plan_name,
            amount,
            billing_period,
            next_billing_date: billing_period.advance(Utc::now()),
        };
        self.repo.create(owner, subscription).await
    }

    pub async fn find(&self, principal: &Principal, subscription_id: Uuid) -> Result<Subscription, AppError> {
        self.repo.find(principal.business_id(), subscription_id).await
    }

    pub async fn transactions(&self, principal: &Principal, subscription_id: Uuid) -> Result<Vec<FinancialTransaction>, AppError> {
        let owner = principal.business_id();
        self.repo.find(owner, subscription_id).await?;
        self.finance.list_for_subscription(owner, subscription_id).await
    }

    /// Renovação otimista. No PIX a cobrança é pedida antes: se o provedor
    /// falhar nada é renovado. Ciclo, lançamento e cobrança são gravados numa
    /// transação só, condicionada a não estar cancelada. A confirmação chega
    /// depois pelo webhook.
    pub async fn renew(
        &self,
        principal: &Principal,
        subscription_id: Uuid,
        payment_method: PaymentMethod,
    ) -> Result<RenewalOutcome, AppError> {
        let owner = principal.business_id();
        let now = Utc::now();

        let current = self.repo.find(owner, subscription_id).await?;
        // Falha cedo (antes de cobrar) se estiver cancelada
        current.renewed(now, payment_method)?;

        // 1. Cobrança / lançamento
        let entry = if payment_method.is_asynchronous() {
            let (charge, income) = self.payments.issue_subscription_charge(principal, &current, now).await?;
            RenewalEntry::Pending { charge, income }
        } else {
            let mut income = NewFinancialTransaction::income(
                current.amount,
                format!("Assinatura: {}", current.plan_name),
                Some(payment_method),
                now.date_naive(),
            );
            income.subscription_id = Some(subscription_id);
            RenewalEntry::Settled(income)
        };

        // 2. Novo ciclo, revalidado sob trava
        let (subscription, transaction, pix_charge) = self
            .repo
            .renew(
                owner,
                subscription_id,
                Box::new(move |s: &Subscription| s.renewed(now, payment_method)),
                entry,
            )
            .await?;

        if let Some(charge) = &pix_charge {
            tracing::info!(charge_id = %charge.id, external_id = %charge.external_id, "💠 Cobrança PIX criada");
        }
        tracing::info!(
            subscription_id = %subscription_id,
            ?payment_method,
            next_billing_date = %subscription.next_billing_date,
            "🔁 Assinatura renovada"
        );
        Ok(RenewalOutcome { subscription, transaction: Some(transaction), pix_charge })
    }

    pub async fn cancel(&self, principal: &Principal, subscription_id: Uuid) -> Result<Subscription, AppError> {
        let now = Utc::now();
        let subscription = self
            .repo
            .update_with(principal.business_id(), subscription_id, Box::new(move |s: &Subscription| s.cancelled(now)))
            .await?;
        tracing::info!(subscription_id = %subscription_id, "Assinatura cancelada");
        Ok(subscription)
    }

    pub async fn record_failed_payment(&self, principal: &Principal, subscription_id: Uuid) -> Result<Subscription, AppError> {
        let now = Utc::now();
        let policy = self.policy;
        let subscription = self
            .repo
            .update_with(
                principal.business_id(),
                subscription_id,
                Box::new(move |s: &Subscription| s.with_failed_payment(policy, now)),
            )
            .await?;

        tracing::warn!(
            subscription_id = %subscription_id,
            failed_payments = subscription.failed_payments_count,
            status = ?subscription.status,
            "Falha de pagamento registrada"
        );
        Ok(subscription)
    }
}
