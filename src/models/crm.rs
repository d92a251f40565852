// src/models/crm.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::notification::NotificationChannel;

// Cadastro mínimo de cliente: o núcleo só precisa saber para onde mandar mensagens.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    #[schema(ignore)]
    pub business_id: Uuid,
    #[schema(example = "Maria Souza")]
    pub name: String,
    #[schema(example = "maria@exemplo.com")]
    pub email: Option<String>,
    #[schema(example = "+5511999998888")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// E-mail tem preferência; sem e-mail, WhatsApp.
    pub fn preferred_contact(&self) -> Option<(NotificationChannel, &str)> {
        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            return Some((NotificationChannel::Email, email));
        }
        self.phone
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|phone| (NotificationChannel::Whatsapp, phone))
    }
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}
