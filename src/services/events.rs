// src/services/events.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    db::{CustomerRepository, TaskRepository},
    models::{
        appointment::{Appointment, DegradedStep, DegradedStepKind},
        auth::Principal,
        crm::Customer,
        loyalty::LoyaltyCard,
        notification::{NewTask, OutboundMessage},
    },
    services::notification_service::NotificationService,
};

/// Eventos emitidos pela finalização do atendimento.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    AppointmentCompleted { appointment: Appointment },
    RewardEarned { appointment_id: Uuid, customer_id: Uuid, card: LoyaltyCard },
}

impl DomainEvent {
    // Chave estável por evento: deduplica tarefa e mensagem
    fn dedup_key(&self) -> String {
        match self {
            DomainEvent::AppointmentCompleted { appointment } => format!("appointment-completed:{}", appointment.id),
            DomainEvent::RewardEarned { appointment_id, .. } => format!("reward-earned:{}", appointment_id),
        }
    }
}

/// Consome os eventos: tarefa de acompanhamento + mensagem ao cliente.
/// Nunca falha; o que não deu certo volta como passo degradado.
#[derive(Clone)]
pub struct EventDispatcher {
    tasks: Arc<dyn TaskRepository>,
    customers: Arc<dyn CustomerRepository>,
    notifications: NotificationService,
}

impl EventDispatcher {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        customers: Arc<dyn CustomerRepository>,
        notifications: NotificationService,
    ) -> Self {
        Self { tasks, customers, notifications }
    }

    pub async fn dispatch(&self, principal: &Principal, event: &DomainEvent) -> Vec<DegradedStep> {
        let mut degraded = Vec::new();
        let key = event.dedup_key();

        let (task, customer_id, message) = match event {
            DomainEvent::AppointmentCompleted { appointment } => (
                NewTask {
                    title: format!("Pós-atendimento: {}", appointment.title),
                    due_date: Some((Utc::now() + Duration::days(1)).date_naive()),
                    appointment_id: Some(appointment.id),
                    source_key: Some(key.clone()),
                },
                appointment.customer_id,
                OutboundMessage {
                    subject: "Obrigado pela visita!".to_string(),
                    body: format!("Seu atendimento \"{}\" foi concluído. Até a próxima!", appointment.title),
                },
            ),
            DomainEvent::RewardEarned { appointment_id, customer_id, card } => (
                NewTask {
                    title: "Entregar recompensa do cartão fidelidade".to_string(),
                    due_date: None,
                    appointment_id: Some(*appointment_id),
                    source_key: Some(key.clone()),
                },
                Some(*customer_id),
                OutboundMessage {
                    subject: "Você ganhou uma recompensa! 🎁".to_string(),
                    body: format!(
                        "Parabéns! Você completou {} carimbos e ganhou uma recompensa.",
                        card.stamps_required
                    ),
                },
            ),
        };

        let reference_id = task.appointment_id;
        match self.tasks.create_once(principal.business_id(), task).await {
            Ok(Some(created)) => tracing::debug!(task_id = %created.id, "Tarefa criada"),
            Ok(None) => tracing::debug!(dedup_key = %key, "Tarefa já existia"),
            Err(e) => {
                tracing::warn!(dedup_key = %key, error = %e, "Falha ao criar tarefa");
                degraded.push(DegradedStep { step: DegradedStepKind::Task, reference_id, message: e.to_string() });
            }
        }

        if let Some(customer_id) = customer_id {
            if let Err(step) = self.notify(principal, &key, customer_id, &message).await {
                degraded.push(step);
            }
        }

        degraded
    }

    async fn notify(
        &self,
        principal: &Principal,
        key: &str,
        customer_id: Uuid,
        message: &OutboundMessage,
    ) -> Result<(), DegradedStep> {
        let failed = |message: String| DegradedStep {
            step: DegradedStepKind::Notification,
            reference_id: Some(customer_id),
            message,
        };

        let customer: Customer = self
            .customers
            .find(principal.business_id(), customer_id)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if customer.preferred_contact().is_none() {
            tracing::debug!(customer_id = %customer_id, "Cliente sem contato, mensagem não enviada");
            return Ok(());
        }

        match self.notifications.deliver_once(principal, key, &customer, message).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::debug!(dedup_key = key, "Mensagem já entregue");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(dedup_key = key, error = %e, "Falha ao notificar cliente");
                Err(failed(e.to_string()))
            }
        }
    }
}
