// src/db/crm_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ensure_owner,
    models::crm::{Customer, NewCustomer},
};

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn create(&self, owner: Uuid, customer: NewCustomer) -> Result<Customer, AppError>;

    async fn find(&self, owner: Uuid, customer_id: Uuid) -> Result<Customer, AppError>;
}

#[derive(Clone)]
pub struct PgCustomerRepository {
    pool: PgPool,
}

impl PgCustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerRepository for PgCustomerRepository {
    async fn create(&self, owner: Uuid, customer: NewCustomer) -> Result<Customer, AppError> {
        sqlx::query_as::<_, Customer>(
            "INSERT INTO customers (business_id, name, email, phone) VALUES ($1, $2, $3, $4) RETURNING *",
        )
            .bind(owner)
            .bind(&customer.name)
            .bind(customer.email.as_deref())
            .bind(customer.phone.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::from_storage(e, "Cliente"))
    }

    async fn find(&self, owner: Uuid, customer_id: Uuid) -> Result<Customer, AppError> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Cliente", customer_id))?;

        ensure_owner("Cliente", customer_id, customer.business_id, owner)?;
        Ok(customer)
    }
}
