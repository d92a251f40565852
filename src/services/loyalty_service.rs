// src/services/loyalty_service.rs

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CustomerRepository, LoyaltyRepository},
    models::{
        auth::Principal,
        loyalty::{LoyaltyCard, VisitOutcome},
    },
};

#[derive(Clone)]
pub struct LoyaltyService {
    repo: Arc<dyn LoyaltyRepository>,
    customers: Arc<dyn CustomerRepository>,
    default_stamps_required: i32,
}

impl LoyaltyService {
    pub fn new(
        repo: Arc<dyn LoyaltyRepository>,
        customers: Arc<dyn CustomerRepository>,
        default_stamps_required: i32,
    ) -> Self {
        Self { repo, customers, default_stamps_required: default_stamps_required.max(1) }
    }

    // O cartão só existe para clientes do próprio negócio.
    async fn ensure_customer(&self, principal: &Principal, customer_id: Uuid) -> Result<(), AppError> {
        self.customers.find(principal.business_id(), customer_id).await.map(|_| ())
    }

    /// Um carimbo por atendimento concluído. O cartão nasce na primeira visita.
    pub async fn register_completed_visit(&self, principal: &Principal, customer_id: Uuid) -> Result<VisitOutcome, AppError> {
        self.ensure_customer(principal, customer_id).await?;
        let outcome = self
            .repo
            .register_visit(principal.business_id(), customer_id, self.default_stamps_required, Utc::now())
            .await?;

        if outcome.reward_earned {
            tracing::info!(
                customer_id = %customer_id,
                rewards = outcome.after.rewards_redeemed,
                "🎁 Cartão fidelidade completo"
            );
        }
        Ok(outcome)
    }

    pub async fn card(&self, principal: &Principal, customer_id: Uuid) -> Result<Option<LoyaltyCard>, AppError> {
        self.ensure_customer(principal, customer_id).await?;
        self.repo.find_card(principal.business_id(), customer_id).await
    }

    pub async fn set_stamps_required(
        &self,
        principal: &Principal,
        customer_id: Uuid,
        stamps_required: i32,
    ) -> Result<VisitOutcome, AppError> {
        if stamps_required < 1 {
            return Err(AppError::InvalidQuantity(format!(
                "Meta do cartão deve ser pelo menos 1 (recebido {})",
                stamps_required
            )));
        }
        self.ensure_customer(principal, customer_id).await?;
        self.repo.set_stamps_required(principal.business_id(), customer_id, stamps_required).await
    }
}
