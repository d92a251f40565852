// src/models/proposal.rs

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        money::{ensure_percentage, overflow, percent_of, round_cents},
    },
    models::appointment::{Appointment, NewAppointment},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "proposal_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Sent,
    Viewed,
    Accepted,
    Confirmed,
    Rejected,
    Canceled,
    Expired,
    Paused,
}

/// Ações que movem a proposta pelo funil (o envio tem regra própria).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalAction {
    View,
    Accept,
    Confirm,
    Reject,
    Pause,
    Resume,
    Expire,
    Cancel,
}

impl ProposalStatus {
    pub fn can_send(self) -> bool {
        matches!(self, ProposalStatus::Pending | ProposalStatus::Sent)
    }

    pub fn can_schedule(self) -> bool {
        matches!(self, ProposalStatus::Accepted | ProposalStatus::Confirmed)
    }

    /// Tabela de arestas permitidas. Tudo que não está aqui é InvalidState.
    pub fn apply(self, action: ProposalAction) -> Result<ProposalStatus, AppError> {
        use ProposalAction as A;
        use ProposalStatus as S;

        let next = match (action, self) {
            (A::View, S::Sent) => S::Viewed,
            (A::Accept, S::Sent | S::Viewed) => S::Accepted,
            (A::Confirm, S::Pending | S::Sent | S::Viewed | S::Accepted) => S::Confirmed,
            (A::Reject, S::Sent | S::Viewed) => S::Rejected,
            (A::Pause, S::Sent | S::Viewed) => S::Paused,
            (A::Resume, S::Paused) => S::Sent,
            (A::Expire, S::Pending | S::Sent | S::Viewed) => S::Expired,
            (A::Cancel, S::Pending | S::Sent | S::Viewed | S::Accepted) => S::Canceled,
            _ => {
                return Err(AppError::InvalidState(format!(
                    "Proposta em {:?} não aceita a ação {:?}",
                    self, action
                )))
            }
        };
        Ok(next)
    }
}

// Uma linha de serviço do orçamento
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProposalLine {
    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "Design de sobrancelha")]
    pub description: String,
    #[schema(example = "2")]
    pub quantity: Decimal,
    #[schema(example = "100.00")]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProposalAmounts {
    pub total_amount: Decimal,
    pub final_amount: Decimal,
    pub deposit_amount: Decimal,
}

impl ProposalAmounts {
    /// final = total × (1 − desconto/100); sinal = final × sinal%/100.
    pub fn compute(
        lines: &[ProposalLine],
        discount_percentage: Decimal,
        deposit_percentage: Decimal,
    ) -> Result<Self, AppError> {
        if lines.is_empty() {
            return Err(AppError::InvalidQuantity("A proposta precisa de ao menos um serviço".to_string()));
        }
        ensure_percentage("discount_percentage", discount_percentage)?;
        ensure_percentage("deposit_percentage", deposit_percentage)?;

        let mut total = Decimal::ZERO;
        for line in lines {
            if line.quantity <= Decimal::ZERO {
                return Err(AppError::InvalidQuantity(format!(
                    "Quantidade de '{}' deve ser positiva",
                    line.description
                )));
            }
            if line.unit_price < Decimal::ZERO {
                return Err(AppError::InvalidQuantity(format!(
                    "Preço de '{}' não pode ser negativo",
                    line.description
                )));
            }
            total = line
                .quantity
                .checked_mul(line.unit_price)
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or_else(|| overflow(&format!("Total de '{}'", line.description)))?;
        }

        let total_amount = round_cents(total);
        let final_amount = round_cents(total - percent_of(total, discount_percentage)?);
        let deposit_amount = round_cents(percent_of(final_amount, deposit_percentage)?);

        Ok(Self { total_amount, final_amount, deposit_amount })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: Uuid,
    #[schema(ignore)]
    pub business_id: Uuid,
    pub customer_id: Option<Uuid>,
    #[schema(example = "Pacote noiva")]
    pub title: String,
    #[schema(value_type = Vec<ProposalLine>)]
    pub services: Json<Vec<ProposalLine>>,
    #[schema(example = "10")]
    pub discount_percentage: Decimal,
    pub total_amount: Decimal,
    pub final_amount: Decimal,
    #[schema(example = "50")]
    pub deposit_percentage: Decimal,
    pub deposit_amount: Decimal,
    pub status: ProposalStatus,
    pub valid_until: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    /// Recalcula os valores a partir dos serviços e percentuais gravados.
    pub fn recompute_amounts(&self) -> Result<ProposalAmounts, AppError> {
        ProposalAmounts::compute(&self.services.0, self.discount_percentage, self.deposit_percentage)
    }

    fn ensure_not_scheduled(&self) -> Result<(), AppError> {
        if let Some(appointment_id) = self.appointment_id {
            return Err(AppError::InvalidState(format!(
                "Proposta {} já virou o agendamento {}",
                self.id, appointment_id
            )));
        }
        Ok(())
    }

    pub fn transition(&self, action: ProposalAction, now: DateTime<Utc>) -> Result<Proposal, AppError> {
        self.ensure_not_scheduled()?;
        let status = self.status.apply(action)?;

        let mut next = self.clone();
        next.status = status;
        next.updated_at = now;
        match action {
            ProposalAction::View => next.viewed_at = Some(now),
            ProposalAction::Accept | ProposalAction::Confirm => {
                next.accepted_at.get_or_insert(now);
            }
            _ => {}
        }
        Ok(next)
    }

    /// Regra de envio: só de pending/sent, e no máximo um envio por janela.
    pub fn with_send(&self, now: DateTime<Utc>, cooldown: Duration) -> Result<Proposal, AppError> {
        self.ensure_not_scheduled()?;
        if !self.status.can_send() {
            return Err(AppError::InvalidState(format!(
                "Proposta em {:?} não pode ser enviada",
                self.status
            )));
        }
        if let Some(last) = self.last_sent_at {
            let elapsed = now - last;
            if elapsed < cooldown {
                return Err(AppError::SendThrottled {
                    retry_after_secs: (cooldown - elapsed).num_seconds().max(1),
                });
            }
        }

        let mut next = self.clone();
        next.status = ProposalStatus::Sent;
        next.sent_at.get_or_insert(now);
        next.last_sent_at = Some(now);
        next.updated_at = now;
        Ok(next)
    }

    pub fn ensure_schedulable(&self) -> Result<(), AppError> {
        if self.appointment_id.is_none() && !self.status.can_schedule() {
            return Err(AppError::InvalidState(format!(
                "Só propostas aceitas ou confirmadas podem ser agendadas (atual: {:?})",
                self.status
            )));
        }
        Ok(())
    }

    /// Dados iniciais do agendamento criado a partir da proposta.
    pub fn appointment_seed(&self, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> NewAppointment {
        NewAppointment {
            customer_id: self.customer_id,
            title: self.title.clone(),
            start_at,
            end_at,
            price: Some(self.final_amount),
            deposit_amount: (self.deposit_amount > Decimal::ZERO).then_some(self.deposit_amount),
            proposal_id: Some(self.id),
        }
    }

    // Depois de agendada a proposta não pode sumir: o agendamento ficaria órfão.
    pub fn ensure_deletable(&self) -> Result<(), AppError> {
        self.ensure_not_scheduled()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, ProposalStatus::Pending | ProposalStatus::Sent | ProposalStatus::Viewed)
            && self.appointment_id.is_none()
            && self.valid_until.is_some_and(|limit| limit < now)
    }
}

#[derive(Debug, Clone)]
pub struct NewProposal {
    pub customer_id: Option<Uuid>,
    pub title: String,
    pub services: Vec<ProposalLine>,
    pub discount_percentage: Decimal,
    pub deposit_percentage: Decimal,
    pub amounts: ProposalAmounts,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Dados de entrada de uma proposta; os valores são sempre calculados no servidor.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "required"))]
    pub title: String,
    #[validate(nested)]
    pub services: Vec<ProposalLine>,
    #[serde(default)]
    pub discount_percentage: Decimal,
    #[serde(default)]
    pub deposit_percentage: Decimal,
    pub valid_until: Option<DateTime<Utc>>,
}

impl ProposalDraft {
    pub fn into_new(self) -> Result<NewProposal, AppError> {
        let amounts = ProposalAmounts::compute(&self.services, self.discount_percentage, self.deposit_percentage)?;
        Ok(NewProposal {
            customer_id: self.customer_id,
            title: self.title.trim().to_string(),
            services: self.services,
            discount_percentage: self.discount_percentage,
            deposit_percentage: self.deposit_percentage,
            amounts,
            valid_until: self.valid_until,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOutcome {
    pub proposal: Proposal,
    pub appointment: Appointment,
    /// false quando o agendamento já existia (clique duplo).
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(qty: &str, price: &str) -> ProposalLine {
        ProposalLine { description: "Serviço".into(), quantity: dec(qty), unit_price: dec(price) }
    }

    fn proposal(status: ProposalStatus) -> Proposal {
        let lines = vec![line("2", "100")];
        let amounts = ProposalAmounts::compute(&lines, dec("10"), dec("50")).unwrap();
        let now = Utc::now();
        Proposal {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            customer_id: None,
            title: "Orçamento".into(),
            services: Json(lines),
            discount_percentage: dec("10"),
            total_amount: amounts.total_amount,
            final_amount: amounts.final_amount,
            deposit_percentage: dec("50"),
            deposit_amount: amounts.deposit_amount,
            status,
            valid_until: None,
            sent_at: None,
            last_sent_at: None,
            viewed_at: None,
            accepted_at: None,
            appointment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn discount_and_deposit_are_derived_from_lines() {
        let amounts = ProposalAmounts::compute(&[line("2", "100")], dec("10"), dec("50")).unwrap();
        assert_eq!(amounts.total_amount, dec("200.00"));
        assert_eq!(amounts.final_amount, dec("180.00"));
        assert_eq!(amounts.deposit_amount, dec("90.00"));
    }

    #[test]
    fn stored_amounts_round_trip() {
        let lines = vec![line("3", "33.33"), line("1.5", "19.99"), line("7", "0.01")];
        let amounts = ProposalAmounts::compute(&lines, dec("12.5"), dec("33")).unwrap();
        let mut stored = proposal(ProposalStatus::Pending);
        stored.services = Json(lines);
        stored.discount_percentage = dec("12.5");
        stored.deposit_percentage = dec("33");
        stored.total_amount = amounts.total_amount;
        stored.final_amount = amounts.final_amount;
        stored.deposit_amount = amounts.deposit_amount;
        assert_eq!(stored.recompute_amounts().unwrap(), amounts);
    }

    #[test]
    fn rejects_empty_or_invalid_lines() {
        assert!(ProposalAmounts::compute(&[], dec("0"), dec("0")).is_err());
        assert!(ProposalAmounts::compute(&[line("0", "10")], dec("0"), dec("0")).is_err());
        assert!(ProposalAmounts::compute(&[line("1", "-1")], dec("0"), dec("0")).is_err());
        assert!(ProposalAmounts::compute(&[line("1", "10")], dec("110"), dec("0")).is_err());
    }

    #[test]
    fn huge_lines_are_rejected_instead_of_overflowing() {
        let huge = "10000000000000000000";
        let err = ProposalAmounts::compute(&[line(huge, huge)], dec("0"), dec("0")).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuantity(_)));

        let half_max = "50000000000000000000000000000";
        let err = ProposalAmounts::compute(&[line("1", half_max), line("1", half_max)], dec("0"), dec("0")).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuantity(_)));
    }

    #[test]
    fn canceled_is_terminal() {
        let canceled = proposal(ProposalStatus::Canceled);
        for action in [
            ProposalAction::View,
            ProposalAction::Accept,
            ProposalAction::Confirm,
            ProposalAction::Resume,
            ProposalAction::Cancel,
        ] {
            assert!(canceled.transition(action, Utc::now()).is_err());
        }
        assert!(canceled.with_send(Utc::now(), Duration::minutes(10)).is_err());
        assert!(canceled.ensure_schedulable().is_err());
    }

    #[test]
    fn scheduled_proposal_never_goes_back() {
        let mut scheduled = proposal(ProposalStatus::Confirmed);
        scheduled.appointment_id = Some(Uuid::new_v4());
        assert!(scheduled.with_send(Utc::now(), Duration::minutes(10)).is_err());
        assert!(scheduled.transition(ProposalAction::Cancel, Utc::now()).is_err());
        assert!(scheduled.transition(ProposalAction::Resume, Utc::now()).is_err());
    }

    #[test]
    fn send_is_throttled_inside_cooldown() {
        let now = Utc::now();
        let sent = proposal(ProposalStatus::Pending).with_send(now, Duration::minutes(10)).unwrap();
        assert_eq!(sent.status, ProposalStatus::Sent);
        assert_eq!(sent.sent_at, Some(now));

        let err = sent.with_send(now + Duration::minutes(3), Duration::minutes(10)).unwrap_err();
        assert!(matches!(err, AppError::SendThrottled { retry_after_secs: 420 }));

        let resent = sent.with_send(now + Duration::minutes(10), Duration::minutes(10)).unwrap();
        assert_eq!(resent.sent_at, Some(now));
        assert_eq!(resent.last_sent_at, Some(now + Duration::minutes(10)));
    }

    #[test]
    fn acceptance_keeps_first_timestamp() {
        let now = Utc::now();
        let accepted = proposal(ProposalStatus::Sent).transition(ProposalAction::Accept, now).unwrap();
        let confirmed = accepted.transition(ProposalAction::Confirm, now + Duration::hours(1)).unwrap();
        assert_eq!(confirmed.status, ProposalStatus::Confirmed);
        assert_eq!(confirmed.accepted_at, Some(now));
    }

    #[test]
    fn only_pending_like_states_expire() {
        let now = Utc::now();
        let mut sent = proposal(ProposalStatus::Sent);
        sent.valid_until = Some(now - Duration::days(1));
        assert!(sent.is_overdue(now));
        let mut accepted = proposal(ProposalStatus::Accepted);
        accepted.valid_until = Some(now - Duration::days(1));
        assert!(!accepted.is_overdue(now));
    }
}
