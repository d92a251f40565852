// src/services/appointment_service.rs

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::{error::AppError, money::round_cents},
    db::{AppointmentRepository, CustomerRepository, FinanceRepository},
    models::{
        appointment::{
            Appointment, CompletionReport, CompletionRequest, CompletionSignal, CompletionUpdate, DegradedStep,
            DegradedStepKind, NewAppointment,
        },
        auth::Principal,
        finance::{FinancialTransaction, NewFinancialTransaction},
        inventory::{MovementReference, StockMovement, StockMovementType},
        loyalty::{reward_detected, LoyaltyCard, VisitOutcome},
    },
    services::{
        events::{DomainEvent, EventDispatcher},
        inventory_service::InventoryService,
        loyalty_service::LoyaltyService,
    },
};

/// Coordena a finalização do atendimento e seus efeitos colaterais.
#[derive(Clone)]
pub struct AppointmentService {
    repo: Arc<dyn AppointmentRepository>,
    customers: Arc<dyn CustomerRepository>,
    finance: Arc<dyn FinanceRepository>,
    inventory: InventoryService,
    loyalty: LoyaltyService,
    events: EventDispatcher,
}

impl AppointmentService {
    pub fn new(
        repo: Arc<dyn AppointmentRepository>,
        customers: Arc<dyn CustomerRepository>,
        finance: Arc<dyn FinanceRepository>,
        inventory: InventoryService,
        loyalty: LoyaltyService,
        events: EventDispatcher,
    ) -> Self {
        Self { repo, customers, finance, inventory, loyalty, events }
    }

    pub async fn create_appointment(&self, principal: &Principal, appointment: NewAppointment) -> Result<Appointment, AppError> {
        let owner = principal.business_id();
        if let Some(customer_id) = appointment.customer_id {
            self.customers.find(owner, customer_id).await?;
        }
        self.repo.create(owner, appointment).await
    }

    pub async fn find_appointment(&self, principal: &Principal, appointment_id: Uuid) -> Result<Appointment, AppError> {
        self.repo.find(principal.business_id(), appointment_id).await
    }

    pub async fn cancel_appointment(&self, principal: &Principal, appointment_id: Uuid) -> Result<Appointment, AppError> {
        let appointment = self.repo.cancel(principal.business_id(), appointment_id, Utc::now()).await?;
        tracing::info!(appointment_id = %appointment_id, "Agendamento cancelado");
        Ok(appointment)
    }

    pub async fn transactions(&self, principal: &Principal, appointment_id: Uuid) -> Result<Vec<FinancialTransaction>, AppError> {
        let owner = principal.business_id();
        self.repo.find(owner, appointment_id).await?;
        self.finance.list_for_appointment(owner, appointment_id).await
    }

    /// Finaliza o atendimento.
    ///
    /// Status + receita são gravados juntos e condicionados a `scheduled`:
    /// uma segunda finalização recebe InvalidState e não duplica nada.
    /// Estoque, fidelidade e notificações vêm depois; falhas nesses passos
    /// aparecem em `degraded` sem desfazer a finalização.
    pub async fn complete_appointment(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
        request: CompletionRequest,
    ) -> Result<CompletionReport, AppError> {
        let owner = principal.business_id();

        // 1. Validação
        let value = request.value.unwrap_or(Decimal::ZERO);
        if value < Decimal::ZERO {
            return Err(AppError::InvalidQuantity(format!("Valor do atendimento não pode ser negativo (recebido {})", value)));
        }
        // Mesma escala do livro-razão (centavos)
        let value = round_cents(value);
        let current = self.repo.find(owner, appointment_id).await?;
        current.ensure_scheduled()?;

        // 2. Status + receita (uma transação)
        let now = Utc::now();
        let charged = value > Decimal::ZERO;
        let update = CompletionUpdate {
            price: charged.then_some(value),
            payment_method: if charged { request.payment_method } else { None },
            completed_at: now,
        };
        let income = charged.then(|| {
            let mut income = NewFinancialTransaction::income(
                value,
                format!("Atendimento: {}", current.title),
                request.payment_method,
                now.date_naive(),
            );
            income.appointment_id = Some(appointment_id);
            income
        });

        let (appointment, transaction) = self.repo.complete(owner, appointment_id, update, income).await?;
        tracing::info!(appointment_id = %appointment_id, value = %value, "✅ Atendimento finalizado");

        let mut degraded = Vec::new();

        // 3. Baixa de estoque (segue em frente se falhar)
        let mut movements: Vec<StockMovement> = Vec::with_capacity(request.stock_usages.len());
        for usage in &request.stock_usages {
            let result = self
                .inventory
                .apply_movement(
                    principal,
                    usage.item_id,
                    usage.quantity,
                    StockMovementType::Out,
                    Some(format!("Consumo no atendimento: {}", appointment.title)),
                    Some(MovementReference::appointment(appointment_id)),
                )
                .await;

            match result {
                Ok(movement) => movements.push(movement),
                Err(e) => {
                    tracing::warn!(appointment_id = %appointment_id, item_id = %usage.item_id, error = %e, "Falha na baixa de estoque");
                    degraded.push(DegradedStep {
                        step: DegradedStepKind::Stock,
                        reference_id: Some(usage.item_id),
                        message: e.to_string(),
                    });
                }
            }
        }

        // 4. Fidelidade
        let mut loyalty = None;
        let mut signal = CompletionSignal::Completed;
        if let Some(customer_id) = appointment.customer_id {
            match self.advance_loyalty(principal, customer_id).await {
                Ok(outcome) => {
                    if reward_detected(&outcome.before, &outcome.after) {
                        signal = CompletionSignal::RewardEarned;
                    }
                    loyalty = Some(outcome.after);
                }
                Err(step) => degraded.push(step),
            }
        }

        // 5. Eventos
        let mut events = vec![DomainEvent::AppointmentCompleted { appointment: appointment.clone() }];
        if let (CompletionSignal::RewardEarned, Some(customer_id), Some(card)) = (signal, appointment.customer_id, &loyalty) {
            events.push(DomainEvent::RewardEarned { appointment_id, customer_id, card: card.clone() });
        }
        for event in &events {
            degraded.extend(self.events.dispatch(principal, event).await);
        }

        if !degraded.is_empty() {
            tracing::warn!(appointment_id = %appointment_id, degraded = degraded.len(), "Finalização concluída com passos degradados");
        }

        Ok(CompletionReport { appointment, transaction, movements, loyalty, signal, degraded })
    }

    // Avanço síncrono. Em erro, relê o cartão: se a visita já aparece conta
    // como aplicada; senão tenta mais uma vez. Sem confirmação vira degradado.
    async fn advance_loyalty(&self, principal: &Principal, customer_id: Uuid) -> Result<VisitOutcome, DegradedStep> {
        let degraded = |message: String| DegradedStep {
            step: DegradedStepKind::Loyalty,
            reference_id: Some(customer_id),
            message,
        };

        let snapshot: Option<Option<LoyaltyCard>> = self.loyalty.card(principal, customer_id).await.ok();

        let first_error = match self.loyalty.register_completed_visit(principal, customer_id).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => e,
        };
        tracing::warn!(customer_id = %customer_id, error = %first_error, "Falha ao carimbar cartão, reconciliando");

        // Sem retrato anterior não dá pra saber se a visita entrou
        let Some(before) = snapshot else {
            return Err(degraded(first_error.to_string()));
        };

        match self.loyalty.card(principal, customer_id).await {
            Ok(Some(after)) if visit_applied(before.as_ref(), &after) => {
                let before = before.unwrap_or_else(|| {
                    LoyaltyCard::fresh(after.business_id, customer_id, after.stamps_required, after.created_at)
                });
                let reward_earned = reward_detected(&before, &after);
                return Ok(VisitOutcome { before, after, reward_earned });
            }
            Ok(_) => {}
            Err(e) => return Err(degraded(e.to_string())),
        }

        self.loyalty
            .register_completed_visit(principal, customer_id)
            .await
            .map_err(|e| {
                tracing::warn!(customer_id = %customer_id, error = %e, "Cartão fidelidade não confirmado");
                degraded(e.to_string())
            })
    }
}

fn visit_applied(before: Option<&LoyaltyCard>, after: &LoyaltyCard) -> bool {
    match before {
        Some(before) => after.total_visits > before.total_visits,
        None => after.total_visits > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_is_visible_when_total_grows() {
        let before = LoyaltyCard::fresh(Uuid::new_v4(), Uuid::new_v4(), 5, Utc::now());
        let (after, _) = before.with_visit(Utc::now());
        assert!(visit_applied(Some(&before), &after));
        assert!(!visit_applied(Some(&after), &after));
        assert!(visit_applied(None, &after));
        assert!(!visit_applied(None, &before));
    }
}
