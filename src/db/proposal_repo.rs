// src/db/proposal_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{appointment_repo::insert_appointment_in, ensure_owner},
    models::{
        appointment::{Appointment, NewAppointment},
        proposal::{NewProposal, Proposal, ScheduleOutcome},
    },
};

/// Função pura aplicada sob o lock da linha.
pub type ProposalChange = Box<dyn FnOnce(&Proposal) -> Result<Proposal, AppError> + Send>;

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn create(&self, owner: Uuid, proposal: NewProposal) -> Result<Proposal, AppError>;

    async fn find(&self, owner: Uuid, proposal_id: Uuid) -> Result<Proposal, AppError>;

    async fn list(&self, owner: Uuid) -> Result<Vec<Proposal>, AppError>;

    /// Read-modify-write atômico (SELECT ... FOR UPDATE + UPDATE).
    async fn update_with(&self, owner: Uuid, proposal_id: Uuid, change: ProposalChange) -> Result<Proposal, AppError>;

    /// Cria o agendamento e grava o vínculo na mesma transação.
    /// Se o vínculo já existe, devolve o agendamento existente (created = false).
    async fn schedule(
        &self,
        owner: Uuid,
        proposal_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, AppError>;

    /// Remoção física; bloqueada quando já existe agendamento.
    async fn delete(&self, owner: Uuid, proposal_id: Uuid) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgProposalRepository {
    pool: PgPool,
}

impl PgProposalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock(conn: &mut PgConnection, owner: Uuid, proposal_id: Uuid) -> Result<Proposal, AppError> {
        let proposal = sqlx::query_as::<_, Proposal>("SELECT * FROM proposals WHERE id = $1 FOR UPDATE")
            .bind(proposal_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::not_found("Proposta", proposal_id))?;

        ensure_owner("Proposta", proposal_id, proposal.business_id, owner)?;
        Ok(proposal)
    }

    async fn save(conn: &mut PgConnection, proposal: &Proposal) -> Result<Proposal, AppError> {
        sqlx::query_as::<_, Proposal>(
            r#"
            UPDATE proposals
            SET status = $1, sent_at = $2, last_sent_at = $3, viewed_at = $4,
                accepted_at = $5, appointment_id = $6, updated_at = $7
            WHERE id = $8
            RETURNING *
            "#,
        )
            .bind(proposal.status)
            .bind(proposal.sent_at)
            .bind(proposal.last_sent_at)
            .bind(proposal.viewed_at)
            .bind(proposal.accepted_at)
            .bind(proposal.appointment_id)
            .bind(proposal.updated_at)
            .bind(proposal.id)
            .fetch_one(conn)
            .await
            .map_err(|e| AppError::from_storage(e, "Proposta"))
    }
}

#[async_trait]
impl ProposalRepository for PgProposalRepository {
    async fn create(&self, owner: Uuid, proposal: NewProposal) -> Result<Proposal, AppError> {
        sqlx::query_as::<_, Proposal>(
            r#"
            INSERT INTO proposals (
                business_id, customer_id, title, services,
                discount_percentage, total_amount, final_amount,
                deposit_percentage, deposit_amount, valid_until
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
            .bind(owner)
            .bind(proposal.customer_id)
            .bind(&proposal.title)
            .bind(Json(&proposal.services))
            .bind(proposal.discount_percentage)
            .bind(proposal.amounts.total_amount)
            .bind(proposal.amounts.final_amount)
            .bind(proposal.deposit_percentage)
            .bind(proposal.amounts.deposit_amount)
            .bind(proposal.valid_until)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::from_storage(e, "Proposta"))
    }

    async fn find(&self, owner: Uuid, proposal_id: Uuid) -> Result<Proposal, AppError> {
        let proposal = sqlx::query_as::<_, Proposal>("SELECT * FROM proposals WHERE id = $1")
            .bind(proposal_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Proposta", proposal_id))?;

        ensure_owner("Proposta", proposal_id, proposal.business_id, owner)?;
        Ok(proposal)
    }

    async fn list(&self, owner: Uuid) -> Result<Vec<Proposal>, AppError> {
        let proposals = sqlx::query_as::<_, Proposal>(
            "SELECT * FROM proposals WHERE business_id = $1 ORDER BY created_at DESC",
        )
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        Ok(proposals)
    }

    async fn update_with(&self, owner: Uuid, proposal_id: Uuid, change: ProposalChange) -> Result<Proposal, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::lock(&mut tx, owner, proposal_id).await?;
        let next = change(&current)?;
        let saved = Self::save(&mut tx, &next).await?;

        tx.commit().await?;
        Ok(saved)
    }

    async fn schedule(
        &self,
        owner: Uuid,
        proposal_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // O lock da proposta serializa cliques duplos; o UNIQUE em
        // proposals.appointment_id segura o resto.
        let current = Self::lock(&mut tx, owner, proposal_id).await?;

        if let Some(appointment_id) = current.appointment_id {
            let appointment = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1")
                .bind(appointment_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(ScheduleOutcome { proposal: current, appointment, created: false });
        }

        current.ensure_schedulable()?;

        let seed: NewAppointment = current.appointment_seed(start_at, end_at);
        let appointment = insert_appointment_in(&mut tx, owner, &seed).await?;

        let mut linked = current.clone();
        linked.appointment_id = Some(appointment.id);
        linked.updated_at = at;
        let proposal = Self::save(&mut tx, &linked).await?;

        tx.commit().await?;
        Ok(ScheduleOutcome { proposal, appointment, created: true })
    }

    async fn delete(&self, owner: Uuid, proposal_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::lock(&mut tx, owner, proposal_id).await?;
        current.ensure_deletable()?;

        sqlx::query("DELETE FROM proposals WHERE id = $1")
            .bind(proposal_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
