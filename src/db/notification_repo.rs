// src/db/notification_repo.rs

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::notification::{NotificationChannel, NotificationKey, NotificationType},
};

/// Marcadores de "já visto" + registro de envios externos.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Quais das chaves informadas o usuário já viu.
    async fn seen_among(&self, user_id: Uuid, keys: &[NotificationKey]) -> Result<HashSet<NotificationKey>, AppError>;

    /// Insere se ausente. Retorna quantas chaves eram novas.
    async fn mark_seen(&self, user_id: Uuid, keys: &[NotificationKey], at: DateTime<Utc>) -> Result<u64, AppError>;

    /// Reserva o envio de uma mensagem lógica. false = já enviada (ou em envio).
    async fn claim_delivery(
        &self,
        owner: Uuid,
        dedup_key: &str,
        channel: NotificationChannel,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Desfaz a reserva após falha no provedor.
    async fn release_delivery(&self, owner: Uuid, dedup_key: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn seen_among(&self, user_id: Uuid, keys: &[NotificationKey]) -> Result<HashSet<NotificationKey>, AppError> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let ids: Vec<Uuid> = keys.iter().map(|k| k.notification_id).collect();
        let rows: Vec<(NotificationType, Uuid)> = sqlx::query_as(
            r#"
            SELECT notification_type, notification_id FROM notification_views
            WHERE user_id = $1 AND notification_id = ANY($2)
            "#,
        )
            .bind(user_id)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let seen = rows
            .into_iter()
            .map(|(notification_type, notification_id)| NotificationKey { notification_type, notification_id })
            .filter(|key| keys.contains(key))
            .collect();
        Ok(seen)
    }

    async fn mark_seen(&self, user_id: Uuid, keys: &[NotificationKey], at: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for key in keys {
            let result = sqlx::query(
                r#"
                INSERT INTO notification_views (user_id, notification_type, notification_id, seen_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, notification_type, notification_id) DO NOTHING
                "#,
            )
                .bind(user_id)
                .bind(key.notification_type)
                .bind(key.notification_id)
                .bind(at)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn claim_delivery(
        &self,
        owner: Uuid,
        dedup_key: &str,
        channel: NotificationChannel,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notification_deliveries (business_id, dedup_key, channel, delivered_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (business_id, dedup_key) DO NOTHING
            "#,
        )
            .bind(owner)
            .bind(dedup_key)
            .bind(channel)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_delivery(&self, owner: Uuid, dedup_key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM notification_deliveries WHERE business_id = $1 AND dedup_key = $2")
            .bind(owner)
            .bind(dedup_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
