// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    common::error::AppError,
    db::{
        AppointmentRepository, CustomerRepository, FinanceRepository, InventoryRepository, LoyaltyRepository,
        MemoryStore, NotificationRepository, PgAppointmentRepository, PgCustomerRepository, PgFinanceRepository,
        PgInventoryRepository, PgLoyaltyRepository, PgNotificationRepository, PgProposalRepository,
        PgSubscriptionRepository, PgTaskRepository, ProposalRepository, SubscriptionRepository, TaskRepository,
    },
    models::subscription::FailedPaymentPolicy,
    services::{
        appointment_service::AppointmentService,
        auth::AuthService,
        crm_service::CrmService,
        events::EventDispatcher,
        inventory_service::InventoryService,
        loyalty_service::LoyaltyService,
        notification_service::{HttpSender, LogSender, NotificationSender, NotificationService},
        payment_service::{HttpGateway, MockGateway, PaymentGateway, PaymentService},
        proposal_service::ProposalService,
        subscription_service::SubscriptionService,
    },
};

/// Configuração lida do ambiente (.env via dotenvy).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub loyalty_stamps_required: i32,
    pub proposal_send_cooldown_minutes: i64,
    pub pix_charge_ttl_hours: i64,
    pub billing_policy: FailedPaymentPolicy,
    pub payment_provider_url: Option<String>,
    pub payment_provider_token: Option<String>,
    pub payment_webhook_secret: Option<String>,
    pub notification_provider_url: Option<String>,
    pub outbound_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_secret: String::new(),
            bind_addr: "0.0.0.0:3000".to_string(),
            loyalty_stamps_required: 5,
            proposal_send_cooldown_minutes: 10,
            pix_charge_ttl_hours: 24,
            billing_policy: FailedPaymentPolicy::default(),
            payment_provider_url: None,
            payment_provider_token: None,
            payment_webhook_secret: None,
            notification_provider_url: None,
            outbound_timeout_secs: 10,
        }
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} inválida: '{}'", name, raw)),
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Settings::default();

        let jwt_secret = optional("JWT_SECRET").ok_or_else(|| anyhow::anyhow!("JWT_SECRET deve ser definido"))?;

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            jwt_secret,
            bind_addr: optional("BIND_ADDR").unwrap_or(defaults.bind_addr),
            loyalty_stamps_required: parsed("LOYALTY_STAMPS_REQUIRED", defaults.loyalty_stamps_required)?,
            proposal_send_cooldown_minutes: parsed("PROPOSAL_SEND_COOLDOWN_MINUTES", defaults.proposal_send_cooldown_minutes)?,
            pix_charge_ttl_hours: parsed("PIX_CHARGE_TTL_HOURS", defaults.pix_charge_ttl_hours)?,
            billing_policy: FailedPaymentPolicy {
                payment_failed_after: parsed("BILLING_PAYMENT_FAILED_AFTER", defaults.billing_policy.payment_failed_after)?,
                suspend_after: parsed("BILLING_SUSPEND_AFTER", defaults.billing_policy.suspend_after)?,
            },
            payment_provider_url: optional("PAYMENT_PROVIDER_URL"),
            payment_provider_token: optional("PAYMENT_PROVIDER_TOKEN"),
            payment_webhook_secret: optional("PAYMENT_WEBHOOK_SECRET"),
            notification_provider_url: optional("NOTIFICATION_PROVIDER_URL"),
            outbound_timeout_secs: parsed("OUTBOUND_TIMEOUT_SECS", defaults.outbound_timeout_secs)?,
        })
    }
}

/// Todas as portas de armazenamento, já com o adaptador escolhido.
#[derive(Clone)]
pub struct Repositories {
    pub customers: Arc<dyn CustomerRepository>,
    pub inventory: Arc<dyn InventoryRepository>,
    pub loyalty: Arc<dyn LoyaltyRepository>,
    pub appointments: Arc<dyn AppointmentRepository>,
    pub finance: Arc<dyn FinanceRepository>,
    pub proposals: Arc<dyn ProposalRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            customers: Arc::new(PgCustomerRepository::new(pool.clone())),
            inventory: Arc::new(PgInventoryRepository::new(pool.clone())),
            loyalty: Arc::new(PgLoyaltyRepository::new(pool.clone())),
            appointments: Arc::new(PgAppointmentRepository::new(pool.clone())),
            finance: Arc::new(PgFinanceRepository::new(pool.clone())),
            proposals: Arc::new(PgProposalRepository::new(pool.clone())),
            subscriptions: Arc::new(PgSubscriptionRepository::new(pool.clone())),
            tasks: Arc::new(PgTaskRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            customers: store.clone(),
            inventory: store.clone(),
            loyalty: store.clone(),
            appointments: store.clone(),
            finance: store.clone(),
            proposals: store.clone(),
            subscriptions: store.clone(),
            tasks: store.clone(),
            notifications: store,
        }
    }
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub db_pool: Option<PgPool>,
    pub auth_service: AuthService,
    pub crm_service: CrmService,
    pub inventory_service: InventoryService,
    pub loyalty_service: LoyaltyService,
    pub notification_service: NotificationService,
    pub proposal_service: ProposalService,
    pub appointment_service: AppointmentService,
    pub payment_service: PaymentService,
    pub subscription_service: SubscriptionService,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let (db_pool, repos) = match &settings.database_url {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await?;
                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
                (Some(pool.clone()), Repositories::postgres(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL ausente: usando armazenamento em memória (dados somem ao reiniciar)");
                (None, Repositories::in_memory())
            }
        };

        let timeout = Duration::from_secs(settings.outbound_timeout_secs);

        let sender: Arc<dyn NotificationSender> = match &settings.notification_provider_url {
            Some(url) => Arc::new(HttpSender::new(url.clone(), timeout)?),
            None => Arc::new(LogSender),
        };

        let gateway: Arc<dyn PaymentGateway> = match (&settings.payment_provider_url, &settings.payment_provider_token) {
            (Some(url), Some(token)) => Arc::new(HttpGateway::new(url.clone(), token.clone(), timeout)?),
            _ => {
                tracing::warn!("Provedor de pagamento não configurado: usando gateway simulado");
                Arc::new(MockGateway)
            }
        };

        Ok(Self::build(settings, db_pool, repos, sender, gateway))
    }

    /// Monta o gráfico de dependências. Usado também pelos testes, com
    /// adaptadores em memória e provedores falsos.
    pub fn build(
        settings: &Settings,
        db_pool: Option<PgPool>,
        repos: Repositories,
        sender: Arc<dyn NotificationSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let auth_service = AuthService::new(settings.jwt_secret.clone());
        let crm_service = CrmService::new(repos.customers.clone());
        let inventory_service = InventoryService::new(repos.inventory.clone());
        let loyalty_service = LoyaltyService::new(repos.loyalty.clone(), repos.customers.clone(), settings.loyalty_stamps_required);

        let notification_service = NotificationService::new(
            repos.notifications.clone(),
            repos.appointments.clone(),
            repos.tasks.clone(),
            sender,
        );

        let proposal_service = ProposalService::new(
            repos.proposals.clone(),
            repos.customers.clone(),
            notification_service.clone(),
            chrono::Duration::minutes(settings.proposal_send_cooldown_minutes),
        );

        let events = EventDispatcher::new(repos.tasks.clone(), repos.customers.clone(), notification_service.clone());

        let appointment_service = AppointmentService::new(
            repos.appointments.clone(),
            repos.customers.clone(),
            repos.finance.clone(),
            inventory_service.clone(),
            loyalty_service.clone(),
            events,
        );

        let payment_service = PaymentService::new(
            gateway,
            repos.finance.clone(),
            repos.subscriptions.clone(),
            repos.customers.clone(),
            notification_service.clone(),
            chrono::Duration::hours(settings.pix_charge_ttl_hours),
            settings.payment_webhook_secret.clone(),
        );

        let subscription_service = SubscriptionService::new(
            repos.subscriptions.clone(),
            repos.customers.clone(),
            repos.finance.clone(),
            payment_service.clone(),
            settings.billing_policy,
        );

        Self {
            db_pool,
            auth_service,
            crm_service,
            inventory_service,
            loyalty_service,
            notification_service,
            proposal_service,
            appointment_service,
            payment_service,
            subscription_service,
        }
    }

    /// Roda as migrações quando há banco.
    pub async fn migrate(&self) -> Result<(), AppError> {
        if let Some(pool) = &self.db_pool {
            sqlx::migrate!()
                .run(pool)
                .await
                .map_err(|e| AppError::InternalServerError(e.into()))?;
            tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
        }
        Ok(())
    }
}
