// src/services/proposal_service.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CustomerRepository, ProposalRepository},
    models::{
        auth::Principal,
        crm::Customer,
        notification::OutboundMessage,
        proposal::{Proposal, ProposalAction, ProposalDraft, ScheduleOutcome},
    },
    services::notification_service::NotificationService,
};

#[derive(Clone)]
pub struct ProposalService {
    repo: Arc<dyn ProposalRepository>,
    customers: Arc<dyn CustomerRepository>,
    notifications: NotificationService,
    send_cooldown: Duration,
}

impl ProposalService {
    pub fn new(
        repo: Arc<dyn ProposalRepository>,
        customers: Arc<dyn CustomerRepository>,
        notifications: NotificationService,
        send_cooldown: Duration,
    ) -> Self {
        Self { repo, customers, notifications, send_cooldown }
    }

    pub async fn create(&self, principal: &Principal, draft: ProposalDraft) -> Result<Proposal, AppError> {
        let owner = principal.business_id();
        if let Some(customer_id) = draft.customer_id {
            self.customers.find(owner, customer_id).await?;
        }
        let proposal = draft.into_new()?;
        self.repo.create(owner, proposal).await
    }

    pub async fn find(&self, principal: &Principal, proposal_id: Uuid) -> Result<Proposal, AppError> {
        self.repo.find(principal.business_id(), proposal_id).await
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<Proposal>, AppError> {
        self.repo.list(principal.business_id()).await
    }

    /// Envio com trava no servidor: primeiro reserva (status/last_sent_at sob
    /// lock), depois entrega. Se a entrega falhar a reserva é desfeita.
    pub async fn send(&self, principal: &Principal, proposal_id: Uuid) -> Result<Proposal, AppError> {
        let owner = principal.business_id();
        let before = self.repo.find(owner, proposal_id).await?;
        let customer = self.recipient(owner, &before).await?;

        // 1. Reserva
        let now = Utc::now();
        let cooldown = self.send_cooldown;
        let claimed = self
            .repo
            .update_with(owner, proposal_id, Box::new(move |p: &Proposal| p.with_send(now, cooldown)))
            .await?;

        // 2. Entrega
        let message = proposal_message(&claimed);
        match self.notifications.send_to_customer(&customer, &message).await {
            Ok(channel) => {
                tracing::info!(proposal_id = %proposal_id, ?channel, "📤 Proposta enviada");
                Ok(claimed)
            }
            Err(e) => {
                tracing::warn!(proposal_id = %proposal_id, error = %e, "Falha ao entregar proposta, desfazendo envio");
                self.revert_send(owner, &before, now).await?;
                match e {
                    AppError::UpstreamService(_) => Err(e),
                    other => Err(AppError::UpstreamService(other.to_string())),
                }
            }
        }
    }

    // Só desfaz se a reserva ainda é a nossa.
    async fn revert_send(&self, owner: Uuid, before: &Proposal, claimed_at: DateTime<Utc>) -> Result<(), AppError> {
        let (status, sent_at, last_sent_at) = (before.status, before.sent_at, before.last_sent_at);
        self.repo
            .update_with(
                owner,
                before.id,
                Box::new(move |p: &Proposal| {
                    let mut reverted = p.clone();
                    if p.last_sent_at == Some(claimed_at) {
                        reverted.status = status;
                        reverted.sent_at = sent_at;
                        reverted.last_sent_at = last_sent_at;
                    }
                    Ok(reverted)
                }),
            )
            .await?;
        Ok(())
    }

    async fn recipient(&self, owner: Uuid, proposal: &Proposal) -> Result<Customer, AppError> {
        let customer_id = proposal
            .customer_id
            .ok_or_else(|| AppError::InvalidState(format!("Proposta {} não tem cliente", proposal.id)))?;
        let customer = self.customers.find(owner, customer_id).await?;
        if customer.preferred_contact().is_none() {
            return Err(AppError::InvalidState(format!(
                "Cliente {} não tem e-mail nem telefone",
                customer.id
            )));
        }
        Ok(customer)
    }

    async fn transition(&self, principal: &Principal, proposal_id: Uuid, action: ProposalAction) -> Result<Proposal, AppError> {
        let now = Utc::now();
        let proposal = self
            .repo
            .update_with(principal.business_id(), proposal_id, Box::new(move |p: &Proposal| p.transition(action, now)))
            .await?;
        tracing::info!(proposal_id = %proposal_id, ?action, status = ?proposal.status, "Proposta atualizada");
        Ok(proposal)
    }

    pub async fn mark_viewed(&self, principal: &Principal, proposal_id: Uuid) -> Result<Proposal, AppError> {
        self.transition(principal, proposal_id, ProposalAction::View).await
    }

    pub async fn accept(&self, principal: &Principal, proposal_id: Uuid) -> Result<Proposal, AppError> {
        self.transition(principal, proposal_id, ProposalAction::Accept).await
    }

    pub async fn confirm(&self, principal: &Principal, proposal_id: Uuid) -> Result<Proposal, AppError> {
        self.transition(principal, proposal_id, ProposalAction::Confirm).await
    }

    pub async fn reject(&self, principal: &Principal, proposal_id: Uuid) -> Result<Proposal, AppError> {
        self.transition(principal, proposal_id, ProposalAction::Reject).await
    }

    pub async fn pause(&self, principal: &Principal, proposal_id: Uuid) -> Result<Proposal, AppError> {
        self.transition(principal, proposal_id, ProposalAction::Pause).await
    }

    pub async fn resume(&self, principal: &Principal, proposal_id: Uuid) -> Result<Proposal, AppError> {
        self.transition(principal, proposal_id, ProposalAction::Resume).await
    }

    pub async fn cancel(&self, principal: &Principal, proposal_id: Uuid) -> Result<Proposal, AppError> {
        self.transition(principal, proposal_id, ProposalAction::Cancel).await
    }

    /// Expira as propostas vencidas em aberto. Retorna as que expiraram agora.
    pub async fn expire_overdue(&self, principal: &Principal, now: DateTime<Utc>) -> Result<Vec<Proposal>, AppError> {
        let owner = principal.business_id();
        let overdue: Vec<Uuid> = self
            .repo
            .list(owner)
            .await?
            .into_iter()
            .filter(|p| p.is_overdue(now))
            .map(|p| p.id)
            .collect();

        let mut expired = Vec::with_capacity(overdue.len());
        for proposal_id in overdue {
            let result = self
                .repo
                .update_with(
                    owner,
                    proposal_id,
                    Box::new(move |p: &Proposal| {
                        // Revalida sob o lock: pode ter sido aceita nesse meio tempo
                        if !p.is_overdue(now) {
                            return Err(AppError::InvalidState(format!("Proposta {} não está mais vencida", p.id)));
                        }
                        p.transition(ProposalAction::Expire, now)
                    }),
                )
                .await;

            match result {
                Ok(p) => expired.push(p),
                Err(AppError::InvalidState(msg)) => tracing::debug!(proposal_id = %proposal_id, reason = %msg, "Expiração ignorada"),
                Err(e) => return Err(e),
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "⌛ Propostas expiradas");
        }
        Ok(expired)
    }

    /// Cria o agendamento a partir da proposta. Chamar de novo devolve o mesmo.
    pub async fn schedule_from_proposal(
        &self,
        principal: &Principal,
        proposal_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, AppError> {
        let outcome = self
            .repo
            .schedule(principal.business_id(), proposal_id, start_at, end_at, Utc::now())
            .await?;

        if outcome.created {
            tracing::info!(
                proposal_id = %proposal_id,
                appointment_id = %outcome.appointment.id,
                "📅 Agendamento criado a partir da proposta"
            );
        }
        Ok(outcome)
    }

    pub async fn delete(&self, principal: &Principal, proposal_id: Uuid) -> Result<(), AppError> {
        self.repo.delete(principal.business_id(), proposal_id).await
    }
}

fn proposal_message(proposal: &Proposal) -> OutboundMessage {
    let mut body = format!("Olá! Segue sua proposta \"{}\".\nValor: R$ {}", proposal.title, proposal.final_amount);
    if !proposal.deposit_amount.is_zero() {
        body.push_str(&format!("\nSinal: R$ {}", proposal.deposit_amount));
    }
    if let Some(valid_until) = proposal.valid_until {
        body.push_str(&format!("\nVálida até {}", valid_until.format("%d/%m/%Y")));
    }
    OutboundMessage { subject: format!("Proposta: {}", proposal.title), body }
}
