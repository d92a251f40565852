// Utilitários compartilhados pelos testes de integração (adaptadores em memória).
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use agenda_backend::{
    common::error::AppError,
    config::{AppState, Repositories, Settings},
    models::{
        auth::Principal,
        crm::{Customer, NewCustomer},
        inventory::{InventoryItem, NewInventoryItem},
        notification::{NotificationChannel, OutboundMessage},
    },
    services::{
        notification_service::NotificationSender,
        payment_service::{MockGateway, PaymentGateway},
    },
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

pub const JWT_SECRET: &str = "segredo-de-teste";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: String,
}

/// Guarda tudo que seria enviado; pode ser ligado para falhar.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Sent>>,
    failing: AtomicBool,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, channel: NotificationChannel, recipient: &str, message: &OutboundMessage) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamService("provedor fora do ar".to_string()));
        }
        self.sent.lock().unwrap().push(Sent {
            channel,
            recipient: recipient.to_string(),
            subject: message.subject.clone(),
        });
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub sender: Arc<RecordingSender>,
}

pub fn test_settings() -> Settings {
    Settings { jwt_secret: JWT_SECRET.to_string(), ..Settings::default() }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_settings(), Repositories::in_memory())
}

pub fn spawn_app_with(settings: Settings, repos: Repositories) -> TestApp {
    let sender = Arc::new(RecordingSender::default());
    let gateway: Arc<dyn PaymentGateway> = Arc::new(MockGateway);
    let state = AppState::build(&settings, None, repos, sender.clone(), gateway);
    TestApp { state, sender }
}

pub fn owner() -> Principal {
    Principal::new(Uuid::new_v4())
}

pub fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

pub async fn customer(app: &TestApp, principal: &Principal, email: Option<&str>) -> Customer {
    app.state
        .crm_service
        .create_customer(
            principal,
            NewCustomer {
                name: "Maria Souza".to_string(),
                email: email.map(str::to_string),
                phone: None,
            },
        )
        .await
        .unwrap()
}

pub async fn item(app: &TestApp, principal: &Principal, stock: &str) -> InventoryItem {
    app.state
        .inventory_service
        .create_item(
            principal,
            NewInventoryItem {
                name: "Esmalte".to_string(),
                unit: "un".to_string(),
                initial_stock: dec(stock),
                minimum_stock: dec("1"),
                cost_price: None,
                sale_price: None,
            },
        )
        .await
        .unwrap()
}
