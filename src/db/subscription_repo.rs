// src/db/subscription_repo.rs

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        ensure_owner,
        finance_repo::{create_pix_charge_in, insert_transaction_in},
    },
    models::{
        finance::{FinancialTransaction, PixCharge},
        subscription::{NewSubscription, RenewalEntry, Subscription},
    },
};

pub type SubscriptionChange = Box<dyn FnOnce(&Subscription) -> Result<Subscription, AppError> + Send>;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, owner: Uuid, subscription: NewSubscription) -> Result<Subscription, AppError>;

    async fn find(&self, owner: Uuid, subscription_id: Uuid) -> Result<Subscription, AppError>;

    /// Read-modify-write atômico do estado de cobrança.
    async fn update_with(
        &self,
        owner: Uuid,
        subscription_id: Uuid,
        change: SubscriptionChange,
    ) -> Result<Subscription, AppError>;

    /// Novo ciclo + lançamento (e cobrança PIX) numa única transação.
    /// Se `change` falhar (ex: cancelada nesse meio tempo) nada é gravado.
    async fn renew(
        &self,
        owner: Uuid,
        subscription_id: Uuid,
        change: SubscriptionChange,
        entry: RenewalEntry,
    ) -> Result<(Subscription, FinancialTransaction, Option<PixCharge>), AppError>;
}

async fn lock_in(conn: &mut PgConnection, owner: Uuid, subscription_id: Uuid) -> Result<Subscription, AppError> {
    let current = sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1 FOR UPDATE")
        .bind(subscription_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Assinatura", subscription_id))?;

    ensure_owner("Assinatura", subscription_id, current.business_id, owner)?;
    Ok(current)
}

async fn save_in(conn: &mut PgConnection, next: &Subscription) -> Result<Subscription, AppError> {
    sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET status = $1, next_billing_date = $2, failed_payments_count = $3,
            last_payment_method = $4, cancelled_at = $5, updated_at = $6
        WHERE id = $7
        RETURNING *
        "#,
    )
        .bind(next.status)
        .bind(next.next_billing_date)
        .bind(next.failed_payments_count)
        .bind(next.last_payment_method)
        .bind(next.cancelled_at)
        .bind(next.updated_at)
        .bind(next.id)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::from_storage(e, "Assinatura"))
}

#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn create(&self, owner: Uuid, subscription: NewSubscription) -> Result<Subscription, AppError> {
        sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (business_id, customer_id, plan_name, amount, billing_period, next_billing_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
            .bind(owner)
            .bind(subscription.customer_id)
            .bind(&subscription.plan_name)
            .bind(subscription.amount)
            .bind(subscription.billing_period)
            .bind(subscription.next_billing_date)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::from_storage(e, "Assinatura"))
    }

    async fn find(&self, owner: Uuid, subscription_id: Uuid) -> Result<Subscription, AppError> {
        let subscription = sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1")
            .bind(subscription_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Assinatura", subscription_id))?;

        ensure_owner("Assinatura", subscription_id, subscription.business_id, owner)?;
        Ok(subscription)
    }

    async fn update_with(
        &self,
        owner: Uuid,
        subscription_id: Uuid,
        change: SubscriptionChange,
    ) -> Result<Subscription, AppError> {
        let mut tx = self.pool.begin().await?;
        let current = lock_in(&mut tx, owner, subscription_id).await?;
        let next = change(&current)?;
        let saved = save_in(&mut tx, &next).await?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn renew(
        &self,
        owner: Uuid,
        subscription_id: Uuid,
        change: SubscriptionChange,
        entry: RenewalEntry,
    ) -> Result<(Subscription, FinancialTransaction, Option<PixCharge>), AppError> {
        let mut tx = self.pool.begin().await?;
        let current = lock_in(&mut tx, owner, subscription_id).await?;
        let next = change(&current)?;

        let (transaction, charge) = match entry {
            RenewalEntry::Settled(income) => (insert_transaction_in(&mut tx, owner, &income).await?, None),
            RenewalEntry::Pending { charge, income } => {
                let (charge, transaction) = create_pix_charge_in(&mut tx, owner, &charge, Some(income)).await?;
                let transaction = transaction
                    .ok_or_else(|| anyhow::anyhow!("Cobrança PIX {} sem lançamento vinculado", charge.id))?;
                (transaction, Some(charge))
            }
        };

        let saved = save_in(&mut tx, &next).await?;
        tx.commit().await?;
        Ok((saved, transaction, charge))
    }
}
