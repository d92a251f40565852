// src/services/notification_service.rs

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::{
    common::error::AppError,
    db::{AppointmentRepository, NotificationRepository, TaskRepository},
    models::{
        auth::Principal,
        crm::Customer,
        notification::{NotificationChannel, NotificationKey, NotificationType, OutboundMessage, UnseenNotification, UnseenSummary},
    },
};

/// Provedor de envio (e-mail / WhatsApp). Só precisamos de sucesso ou falha.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, channel: NotificationChannel, recipient: &str, message: &OutboundMessage) -> Result<(), AppError>;
}

/// Sem provedor configurado: só registra no log.
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, channel: NotificationChannel, recipient: &str, message: &OutboundMessage) -> Result<(), AppError> {
        tracing::info!(?channel, recipient, subject = %message.subject, "📨 Notificação (modo log)");
        Ok(())
    }
}

pub struct HttpSender {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSender {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Falha ao criar cliente HTTP de notificações: {}", e))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl NotificationSender for HttpSender {
    async fn send(&self, channel: NotificationChannel, recipient: &str, message: &OutboundMessage) -> Result<(), AppError> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&json!({
                "channel": channel,
                "recipient": recipient,
                "subject": message.subject,
                "body": message.body,
            }))
            .send()
            .await
            .map_err(|e| AppError::UpstreamService(format!("Provedor de notificações indisponível: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamService(format!(
                "Provedor de notificações respondeu {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    tasks: Arc<dyn TaskRepository>,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        tasks: Arc<dyn TaskRepository>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self { repo, appointments, tasks, sender }
    }

    /// Badge do calendário: agendamentos do dia + tarefas pendentes ainda não vistos.
    pub async fn unseen(&self, principal: &Principal, today: NaiveDate) -> Result<UnseenSummary, AppError> {
        let owner = principal.business_id();

        let mut candidates: Vec<UnseenNotification> = self
            .appointments
            .list_scheduled_for_day(owner, today)
            .await?
            .into_iter()
            .map(|a| UnseenNotification {
                key: NotificationKey { notification_type: NotificationType::Appointment, notification_id: a.id },
                title: a.title,
                at: Some(a.start_at),
            })
            .collect();

        candidates.extend(self.tasks.list_pending(owner).await?.into_iter().map(|t| UnseenNotification {
            key: NotificationKey { notification_type: NotificationType::Task, notification_id: t.id },
            title: t.title,
            at: None,
        }));

        let keys: Vec<NotificationKey> = candidates.iter().map(|c| c.key).collect();
        let seen = self.repo.seen_among(principal.user_id, &keys).await?;

        let items: Vec<UnseenNotification> = candidates.into_iter().filter(|c| !seen.contains(&c.key)).collect();
        Ok(UnseenSummary { badge_count: items.len(), items })
    }

    /// Re-marcar é no-op. Retorna quantas marcações eram novas.
    pub async fn mark_seen(&self, principal: &Principal, keys: &[NotificationKey]) -> Result<u64, AppError> {
        self.repo.mark_seen(principal.user_id, keys, Utc::now()).await
    }

    pub async fn send_direct(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        message: &OutboundMessage,
    ) -> Result<(), AppError> {
        self.sender.send(channel, recipient, message).await
    }

    /// Envio direto pelo canal preferido do cliente (e-mail, senão WhatsApp).
    pub async fn send_to_customer(&self, customer: &Customer, message: &OutboundMessage) -> Result<NotificationChannel, AppError> {
        let (channel, recipient) = customer.preferred_contact().ok_or_else(|| {
            AppError::InvalidState(format!("Cliente {} não tem e-mail nem telefone", customer.id))
        })?;
        self.sender.send(channel, recipient, message).await?;
        Ok(channel)
    }

    /// No máximo um envio por mensagem lógica. false = já tinha sido enviada.
    /// Se o provedor falhar a reserva é desfeita para permitir nova tentativa.
    pub async fn deliver_once(
        &self,
        principal: &Principal,
        dedup_key: &str,
        customer: &Customer,
        message: &OutboundMessage,
    ) -> Result<bool, AppError> {
        let owner = principal.business_id();
        let (channel, recipient) = customer.preferred_contact().ok_or_else(|| {
            AppError::InvalidState(format!("Cliente {} não tem e-mail nem telefone", customer.id))
        })?;

        if !self.repo.claim_delivery(owner, dedup_key, channel, Utc::now()).await? {
            tracing::debug!(dedup_key, "Mensagem já enviada, ignorando");
            return Ok(false);
        }

        if let Err(e) = self.sender.send(channel, recipient, message).await {
            self.repo.release_delivery(owner, dedup_key).await?;
            return Err(e);
        }
        Ok(true)
    }
}
