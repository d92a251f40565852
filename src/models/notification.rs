// src/models/notification.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Marcadores de "já visto" (badge do calendário) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Appointment,
    Task,
}

/// Chave de deduplicação: (tipo, id) para um usuário.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationKey {
    pub notification_type: NotificationType,
    pub notification_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub notification_id: Uuid,
    pub seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnseenNotification {
    #[serde(flatten)]
    pub key: NotificationKey,
    pub title: String,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnseenSummary {
    pub badge_count: usize,
    pub items: Vec<UnseenNotification>,
}

// --- Tarefas (geradas pelos eventos do núcleo) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    #[schema(ignore)]
    pub business_id: Uuid,
    #[schema(example = "Pós-atendimento: ligar para Maria")]
    pub title: String,
    pub status: TaskStatus,
    #[schema(value_type = Option<String>, format = Date)]
    pub due_date: Option<NaiveDate>,
    pub appointment_id: Option<Uuid>,
    // Chave única por negócio; impede tarefa duplicada para o mesmo evento
    pub source_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub appointment_id: Option<Uuid>,
    pub source_key: Option<String>,
}

// --- Envio externo ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "notification_channel", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Whatsapp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub subject: String,
    pub body: String,
}
