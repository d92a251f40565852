// src/db/appointment_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{ensure_owner, finance_repo::insert_transaction_in},
    models::{
        appointment::{Appointment, AppointmentPaymentStatus, AppointmentStatus, CompletionUpdate, NewAppointment},
        finance::{FinancialTransaction, NewFinancialTransaction},
    },
};

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn create(&self, owner: Uuid, appointment: NewAppointment) -> Result<Appointment, AppError>;

    async fn find(&self, owner: Uuid, appointment_id: Uuid) -> Result<Appointment, AppError>;

    /// Marca como concluído e grava a receita na MESMA transação.
    /// Condicional a status = scheduled: quem perder a corrida recebe InvalidState.
    async fn complete(
        &self,
        owner: Uuid,
        appointment_id: Uuid,
        update: CompletionUpdate,
        income: Option<NewFinancialTransaction>,
    ) -> Result<(Appointment, Option<FinancialTransaction>), AppError>;

    async fn cancel(&self, owner: Uuid, appointment_id: Uuid, at: DateTime<Utc>) -> Result<Appointment, AppError>;

    /// Agendamentos ainda em aberto de um dia (para o badge do calendário).
    async fn list_scheduled_for_day(&self, owner: Uuid, day: NaiveDate) -> Result<Vec<Appointment>, AppError>;
}

// Usado também pelo agendamento a partir de proposta (mesma transação).
pub(crate) async fn insert_appointment_in(
    conn: &mut PgConnection,
    owner: Uuid,
    appointment: &NewAppointment,
) -> Result<Appointment, AppError> {
    appointment.validate()?;

    sqlx::query_as::<_, Appointment>(
        r#"
        INSERT INTO appointments (
            business_id, customer_id, title, start_at, end_at,
            price, deposit_amount, proposal_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
        .bind(owner)
        .bind(appointment.customer_id)
        .bind(&appointment.title)
        .bind(appointment.start_at)
        .bind(appointment.end_at)
        .bind(appointment.price)
        .bind(appointment.deposit_amount)
        .bind(appointment.proposal_id)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::from_storage(e, "Agendamento"))
}

#[derive(Clone)]
pub struct PgAppointmentRepository {
    pool: PgPool,
}

impl PgAppointmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock(conn: &mut PgConnection, owner: Uuid, appointment_id: Uuid) -> Result<Appointment, AppError> {
        let appointment = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1 FOR UPDATE")
            .bind(appointment_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::not_found("Agendamento", appointment_id))?;

        ensure_owner("Agendamento", appointment_id, appointment.business_id, owner)?;
        Ok(appointment)
    }
}

#[async_trait]
impl AppointmentRepository for PgAppointmentRepository {
    async fn create(&self, owner: Uuid, appointment: NewAppointment) -> Result<Appointment, AppError> {
        let mut conn = self.pool.acquire().await?;
        insert_appointment_in(&mut conn, owner, &appointment).await
    }

    async fn find(&self, owner: Uuid, appointment_id: Uuid) -> Result<Appointment, AppError> {
        let appointment = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1")
            .bind(appointment_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Agendamento", appointment_id))?;

        ensure_owner("Agendamento", appointment_id, appointment.business_id, owner)?;
        Ok(appointment)
    }

    async fn complete(
        &self,
        owner: Uuid,
        appointment_id: Uuid,
        update: CompletionUpdate,
        income: Option<NewFinancialTransaction>,
    ) -> Result<(Appointment, Option<FinancialTransaction>), AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Trava e revalida o status dentro da transação
        let current = Self::lock(&mut tx, owner, appointment_id).await?;
        current.ensure_scheduled()?;

        // 2. Status + pagamento
        let completed = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments
            SET status = $1, payment_status = $2,
                price = COALESCE($3, price),
                payment_method = COALESCE($4, payment_method),
                completed_at = $5, updated_at = $5
            WHERE id = $6
            RETURNING *
            "#,
        )
            .bind(AppointmentStatus::Completed)
            .bind(AppointmentPaymentStatus::Paid)
            .bind(update.price)
            .bind(update.payment_method)
            .bind(update.completed_at)
            .bind(appointment_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::from_storage(e, "Agendamento"))?;

        // 3. Receita no livro-razão (se houver valor)
        let transaction = match income {
            Some(new_tx) => Some(insert_transaction_in(&mut tx, owner, &new_tx).await?),
            None => None,
        };

        tx.commit().await?;
        Ok((completed, transaction))
    }

    async fn cancel(&self, owner: Uuid, appointment_id: Uuid, at: DateTime<Utc>) -> Result<Appointment, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::lock(&mut tx, owner, appointment_id).await?;
        current.ensure_scheduled()?;

        let cancelled = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments
            SET status = $1, payment_status = $2, updated_at = $3
            WHERE id = $4
            RETURNING *
            "#,
        )
            .bind(AppointmentStatus::Cancelled)
            .bind(AppointmentPaymentStatus::Cancelled)
            .bind(at)
            .bind(appointment_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(cancelled)
    }

    async fn list_scheduled_for_day(&self, owner: Uuid, day: NaiveDate) -> Result<Vec<Appointment>, AppError> {
        let appointments = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT * FROM appointments
            WHERE business_id = $1 AND status = $2 AND (start_at AT TIME ZONE 'UTC')::date = $3
            ORDER BY start_at ASC
            "#,
        )
            .bind(owner)
            .bind(AppointmentStatus::Scheduled)
            .bind(day)
            .fetch_all(&self.pool)
            .await?;
        Ok(appointments)
    }
}
