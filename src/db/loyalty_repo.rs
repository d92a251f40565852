// src/db/loyalty_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::loyalty::{LoyaltyCard, VisitOutcome},
};

/// Porta do cartão fidelidade. Toda escrita é read-modify-write
/// serializado por (negócio, cliente).
#[async_trait]
pub trait LoyaltyRepository: Send + Sync {
    async fn find_card(&self, owner: Uuid, customer_id: Uuid) -> Result<Option<LoyaltyCard>, AppError>;

    /// Cria o cartão se preciso e registra uma visita concluída.
    async fn register_visit(
        &self,
        owner: Uuid,
        customer_id: Uuid,
        default_stamps_required: i32,
        at: DateTime<Utc>,
    ) -> Result<VisitOutcome, AppError>;

    async fn set_stamps_required(
        &self,
        owner: Uuid,
        customer_id: Uuid,
        stamps_required: i32,
    ) -> Result<VisitOutcome, AppError>;
}

#[derive(Clone)]
pub struct PgLoyaltyRepository {
    pool: PgPool,
}

impl PgLoyaltyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Garante que o cartão existe e devolve a linha travada (FOR UPDATE).
    async fn lock_card(
        tx: &mut Transaction<'_, Postgres>,
        owner: Uuid,
        customer_id: Uuid,
        stamps_required: i32,
    ) -> Result<LoyaltyCard, AppError> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_cards (business_id, customer_id, stamps_required)
            VALUES ($1, $2, $3)
            ON CONFLICT (business_id, customer_id) DO NOTHING
            "#,
        )
            .bind(owner)
            .bind(customer_id)
            .bind(stamps_required.max(1))
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::from_storage(e, "Cartão fidelidade"))?;

        let card = sqlx::query_as::<_, LoyaltyCard>(
            "SELECT * FROM loyalty_cards WHERE business_id = $1 AND customer_id = $2 FOR UPDATE",
        )
            .bind(owner)
            .bind(customer_id)
            .fetch_one(&mut **tx)
            .await?;
        Ok(card)
    }

    async fn save_card(tx: &mut Transaction<'_, Postgres>, card: &LoyaltyCard) -> Result<LoyaltyCard, AppError> {
        let saved = sqlx::query_as::<_, LoyaltyCard>(
            r#"
            UPDATE loyalty_cards
            SET current_stamps = $1, stamps_required = $2, total_visits = $3,
                rewards_redeemed = $4, last_visit_at = $5
            WHERE id = $6
            RETURNING *
            "#,
        )
            .bind(card.current_stamps)
            .bind(card.stamps_required)
            .bind(card.total_visits)
            .bind(card.rewards_redeemed)
            .bind(card.last_visit_at)
            .bind(card.id)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| AppError::from_storage(e, "Cartão fidelidade"))?;
        Ok(saved)
    }
}

#[async_trait]
impl LoyaltyRepository for PgLoyaltyRepository {
    async fn find_card(&self, owner: Uuid, customer_id: Uuid) -> Result<Option<LoyaltyCard>, AppError> {
        let card = sqlx::query_as::<_, LoyaltyCard>(
            "SELECT * FROM loyalty_cards WHERE business_id = $1 AND customer_id = $2",
        )
            .bind(owner)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(card)
    }

    async fn register_visit(
        &self,
        owner: Uuid,
        customer_id: Uuid,
        default_stamps_required: i32,
        at: DateTime<Utc>,
    ) -> Result<VisitOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let before = Self::lock_card(&mut tx, owner, customer_id, default_stamps_required).await?;
        let (next, reward_earned) = before.with_visit(at);
        let after = Self::save_card(&mut tx, &next).await?;

        tx.commit().await?;
        Ok(VisitOutcome { before, after, reward_earned })
    }

    async fn set_stamps_required(
        &self,
        owner: Uuid,
        customer_id: Uuid,
        stamps_required: i32,
    ) -> Result<VisitOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let before = Self::lock_card(&mut tx, owner, customer_id, stamps_required).await?;
        let (next, reward_earned) = before.with_stamps_required(stamps_required);
        let after = Self::save_card(&mut tx, &next).await?;

        tx.commit().await?;
        Ok(VisitOutcome { before, after, reward_earned })
    }
}
