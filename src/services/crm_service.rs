// src/services/crm_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::CustomerRepository,
    models::{
        auth::Principal,
        crm::{Customer, NewCustomer},
    },
};

#[derive(Clone)]
pub struct CrmService {
    repo: Arc<dyn CustomerRepository>,
}

impl CrmService {
    pub fn new(repo: Arc<dyn CustomerRepository>) -> Self {
        Self { repo }
    }

    pub async fn create_customer(&self, principal: &Principal, customer: NewCustomer) -> Result<Customer, AppError> {
        let name = customer.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidState("Nome do cliente é obrigatório".to_string()));
        }
        self.repo.create(principal.business_id(), NewCustomer { name, ..customer }).await
    }

    pub async fn find_customer(&self, principal: &Principal, customer_id: Uuid) -> Result<Customer, AppError> {
        self.repo.find(principal.business_id(), customer_id).await
    }
}
