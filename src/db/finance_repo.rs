// src/db/finance_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ensure_owner,
    models::finance::{
        FinancialTransaction, NewFinancialTransaction, NewPixCharge, PixCharge, PixChargeStatus, TransactionStatus,
    },
};

/// Livro-razão financeiro + cobranças PIX.
#[async_trait]
pub trait FinanceRepository: Send + Sync {
    async fn insert_transaction(
        &self,
        owner: Uuid,
        transaction: NewFinancialTransaction,
    ) -> Result<FinancialTransaction, AppError>;

    async fn list_for_appointment(&self, owner: Uuid, appointment_id: Uuid) -> Result<Vec<FinancialTransaction>, AppError>;

    async fn list_for_subscription(&self, owner: Uuid, subscription_id: Uuid) -> Result<Vec<FinancialTransaction>, AppError>;

    /// Cria a cobrança e, opcionalmente, o lançamento pendente vinculado a ela.
    async fn create_pix_charge(
        &self,
        owner: Uuid,
        charge: NewPixCharge,
        pending_income: Option<NewFinancialTransaction>,
    ) -> Result<(PixCharge, Option<FinancialTransaction>), AppError>;

    async fn find_pix_charge(&self, owner: Uuid, charge_id: Uuid) -> Result<PixCharge, AppError>;

    /// Sem dono: usado apenas pelo webhook do provedor.
    async fn find_pix_charge_by_external(&self, external_id: &str) -> Result<Option<PixCharge>, AppError>;

    /// Liquida uma cobrança pendente (pago/expirado/cancelado) e o lançamento
    /// vinculado na mesma transação. Retorna None se ela já não estava pendente.
    async fn settle_pix_charge(
        &self,
        charge_id: Uuid,
        status: PixChargeStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<PixCharge>, AppError>;

    async fn list_overdue_charges(&self, owner: Uuid, now: DateTime<Utc>) -> Result<Vec<PixCharge>, AppError>;

    /// Incrementa reminders_sent de uma cobrança pendente.
    async fn record_charge_reminder(&self, owner: Uuid, charge_id: Uuid) -> Result<PixCharge, AppError>;
}

pub(crate) async fn insert_transaction_in(
    conn: &mut PgConnection,
    owner: Uuid,
    transaction: &NewFinancialTransaction,
) -> Result<FinancialTransaction, AppError> {
    transaction.validate_amount()?;

    sqlx::query_as::<_, FinancialTransaction>(
        r#"
        INSERT INTO financial_transactions (
            business_id, transaction_type, amount, description, payment_method, status,
            transaction_date, appointment_id, category_id, pix_charge_id, subscription_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
        .bind(owner)
        .bind(transaction.transaction_type)
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(transaction.payment_method)
        .bind(transaction.status)
        .bind(transaction.transaction_date)
        .bind(transaction.appointment_id)
        .bind(transaction.category_id)
        .bind(transaction.pix_charge_id)
        .bind(transaction.subscription_id)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::from_storage(e, "Lançamento financeiro"))
}

/// Cobrança + lançamento pendente numa conexão já em transação.
pub(crate) async fn create_pix_charge_in(
    conn: &mut PgConnection,
    owner: Uuid,
    charge: &NewPixCharge,
    pending_income: Option<NewFinancialTransaction>,
) -> Result<(PixCharge, Option<FinancialTransaction>), AppError> {
    let mut created = sqlx::query_as::<_, PixCharge>(
        r#"
        INSERT INTO pix_charges (
            business_id, external_id, amount, customer_name, customer_phone,
            qr_payload, qr_svg, expires_at, appointment_id, subscription_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
        .bind(owner)
        .bind(&charge.external_id)
        .bind(charge.amount)
        .bind(charge.customer_name.as_deref())
        .bind(charge.customer_phone.as_deref())
        .bind(&charge.qr_payload)
        .bind(charge.qr_svg.as_deref())
        .bind(charge.expires_at)
        .bind(charge.appointment_id)
        .bind(charge.subscription_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::from_storage(e, "Cobrança PIX"))?;

    let transaction = match pending_income {
        Some(mut income) => {
            income.pix_charge_id = Some(created.id);
            let inserted = insert_transaction_in(&mut *conn, owner, &income).await?;

            created = sqlx::query_as::<_, PixCharge>(
                "UPDATE pix_charges SET transaction_id = $1 WHERE id = $2 RETURNING *",
            )
                .bind(inserted.id)
                .bind(created.id)
                .fetch_one(&mut *conn)
                .await?;
            Some(inserted)
        }
        None => None,
    };

    Ok((created, transaction))
}

#[derive(Clone)]
pub struct PgFinanceRepository {
    pool: PgPool,
}

impl PgFinanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FinanceRepository for PgFinanceRepository {
    async fn insert_transaction(
        &self,
        owner: Uuid,
        transaction: NewFinancialTransaction,
    ) -> Result<FinancialTransaction, AppError> {
        let mut conn = self.pool.acquire().await?;
        insert_transaction_in(&mut conn, owner, &transaction).await
    }

    async fn list_for_appointment(&self, owner: Uuid, appointment_id: Uuid) -> Result<Vec<FinancialTransaction>, AppError> {
        let rows = sqlx::query_as::<_, FinancialTransaction>(
            "SELECT * FROM financial_transactions WHERE business_id = $1 AND appointment_id = $2 ORDER BY created_at ASC",
        )
            .bind(owner)
            .bind(appointment_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_for_subscription(&self, owner: Uuid, subscription_id: Uuid) -> Result<Vec<FinancialTransaction>, AppError> {
        let rows = sqlx::query_as::<_, FinancialTransaction>(
            "SELECT * FROM financial_transactions WHERE business_id = $1 AND subscription_id = $2 ORDER BY created_at ASC",
        )
            .bind(owner)
            .bind(subscription_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn create_pix_charge(
        &self,
        owner: Uuid,
        charge: NewPixCharge,
        pending_income: Option<NewFinancialTransaction>,
    ) -> Result<(PixCharge, Option<FinancialTransaction>), AppError> {
        let mut tx = self.pool.begin().await?;
        let created = create_pix_charge_in(&mut tx, owner, &charge, pending_income).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn find_pix_charge(&self, owner: Uuid, charge_id: Uuid) -> Result<PixCharge, AppError> {
        let charge = sqlx::query_as::<_, PixCharge>("SELECT * FROM pix_charges WHERE id = $1")
            .bind(charge_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Cobrança PIX", charge_id))?;

        ensure_owner("Cobrança PIX", charge_id, charge.business_id, owner)?;
        Ok(charge)
    }

    async fn find_pix_charge_by_external(&self, external_id: &str) -> Result<Option<PixCharge>, AppError> {
        let charge = sqlx::query_as::<_, PixCharge>("SELECT * FROM pix_charges WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(charge)
    }

    async fn settle_pix_charge(
        &self,
        charge_id: Uuid,
        status: PixChargeStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<PixCharge>, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, PixCharge>("SELECT * FROM pix_charges WHERE id = $1 FOR UPDATE")
            .bind(charge_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Cobrança PIX", charge_id))?;

        if !current.status.can_settle_to(status) {
            return Ok(None);
        }

        let paid_at = (status == PixChargeStatus::Paid).then_some(at);
        let settled = sqlx::query_as::<_, PixCharge>(
            "UPDATE pix_charges SET status = $1, paid_at = $2 WHERE id = $3 RETURNING *",
        )
            .bind(status)
            .bind(paid_at)
            .bind(charge_id)
            .fetch_one(&mut *tx)
            .await?;

        // Lançamento pendente vinculado: pago -> completed, demais -> cancelled
        if let Some(transaction_id) = settled.transaction_id {
            let tx_status = if status == PixChargeStatus::Paid {
                TransactionStatus::Completed
            } else {
                TransactionStatus::Cancelled
            };
            sqlx::query("UPDATE financial_transactions SET status = $1 WHERE id = $2 AND status = $3")
                .bind(tx_status)
                .bind(transaction_id)
                .bind(TransactionStatus::Pending)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(Some(settled))
    }

    async fn list_overdue_charges(&self, owner: Uuid, now: DateTime<Utc>) -> Result<Vec<PixCharge>, AppError> {
        let rows = sqlx::query_as::<_, PixCharge>(
            "SELECT * FROM pix_charges WHERE business_id = $1 AND status = $2 AND expires_at < $3 ORDER BY expires_at ASC",
        )
            .bind(owner)
            .bind(PixChargeStatus::Pending)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn record_charge_reminder(&self, owner: Uuid, charge_id: Uuid) -> Result<PixCharge, AppError> {
        let current = self.find_pix_charge(owner, charge_id).await?;

        sqlx::query_as::<_, PixCharge>(
            r#"
            UPDATE pix_charges SET reminders_sent = reminders_sent + 1
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
            .bind(charge_id)
            .bind(PixChargeStatus::Pending)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::InvalidState(format!(
                "Cobrança {} não está pendente ({:?})",
                charge_id, current.status
            )))
    }
}
