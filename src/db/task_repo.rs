// src/db/task_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::notification::{NewTask, Task, TaskStatus},
};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Cria a tarefa a menos que já exista uma com o mesmo source_key.
    /// None = duplicada.
    async fn create_once(&self, owner: Uuid, task: NewTask) -> Result<Option<Task>, AppError>;

    async fn list_pending(&self, owner: Uuid) -> Result<Vec<Task>, AppError>;
}

#[derive(Clone)]
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn create_once(&self, owner: Uuid, task: NewTask) -> Result<Option<Task>, AppError> {
        let created = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (business_id, title, due_date, appointment_id, source_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (business_id, source_key) DO NOTHING
            RETURNING *
            "#,
        )
            .bind(owner)
            .bind(&task.title)
            .bind(task.due_date)
            .bind(task.appointment_id)
            .bind(task.source_key.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_storage(e, "Tarefa"))?;
        Ok(created)
    }

    async fn list_pending(&self, owner: Uuid) -> Result<Vec<Task>, AppError> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE business_id = $1 AND status = $2 ORDER BY created_at ASC",
        )
            .bind(owner)
            .bind(TaskStatus::Pending)
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }
}
