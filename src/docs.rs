// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- CRM ---
        handlers::crm::create_customer,
        handlers::crm::get_customer,

        // --- Loyalty ---
        handlers::crm::get_loyalty_card,
        handlers::crm::set_stamps_required,

        // --- INVENTORY ---
        handlers::inventory::create_item,
        handlers::inventory::list_items,
        handlers::inventory::low_stock_items,
        handlers::inventory::apply_movement,
        handlers::inventory::list_movements,

        // --- Appointments ---
        handlers::appointments::create_appointment,
        handlers::appointments::get_appointment,
        handlers::appointments::complete_appointment,
        handlers::appointments::cancel_appointment,
        handlers::appointments::list_transactions,

        // --- Proposals ---
        handlers::proposals::create_proposal,
        handlers::proposals::list_proposals,
        handlers::proposals::get_proposal,
        handlers::proposals::send_proposal,
        handlers::proposals::mark_viewed,
        handlers::proposals::accept_proposal,
        handlers::proposals::confirm_proposal,
        handlers::proposals::reject_proposal,
        handlers::proposals::pause_proposal,
        handlers::proposals::resume_proposal,
        handlers::proposals::cancel_proposal,
        handlers::proposals::expire_overdue,
        handlers::proposals::schedule_proposal,
        handlers::proposals::delete_proposal,

        // --- Subscriptions ---
        handlers::subscriptions::create_subscription,
        handlers::subscriptions::get_subscription,
        handlers::subscriptions::renew_subscription,
        handlers::subscriptions::cancel_subscription,
        handlers::subscriptions::record_failed_payment,
        handlers::subscriptions::list_transactions,

        // --- Payments ---
        handlers::payments::pix_webhook,
        handlers::payments::get_charge,
        handlers::payments::send_reminder,
        handlers::payments::expire_overdue_charges,

        // --- Notifications ---
        handlers::notifications::unseen,
        handlers::notifications::mark_seen,
    ),
    components(
        schemas(
            // --- CRM / Loyalty ---
            models::crm::Customer,
            models::loyalty::LoyaltyCard,
            models::loyalty::VisitOutcome,
            handlers::crm::CreateCustomerPayload,
            handlers::crm::StampsRequiredPayload,

            // --- Inventory ---
            models::inventory::InventoryItem,
            models::inventory::StockMovementType,
            models::inventory::MovementReference,
            models::inventory::StockMovement,
            handlers::inventory::CreateItemPayload,
            handlers::inventory::StockMovementPayload,

            // --- Appointments ---
            models::appointment::AppointmentStatus,
            models::appointment::AppointmentPaymentStatus,
            models::appointment::Appointment,
            models::appointment::StockUsage,
            models::appointment::CompletionRequest,
            models::appointment::CompletionSignal,
            models::appointment::DegradedStepKind,
            models::appointment::DegradedStep,
            models::appointment::CompletionReport,
            handlers::appointments::CreateAppointmentPayload,

            // --- FINANCE ---
            models::finance::TransactionType,
            models::finance::TransactionStatus,
            models::finance::PaymentMethod,
            models::finance::FinancialTransaction,
            models::finance::PixChargeStatus,
            models::finance::PixCharge,
            models::finance::PixWebhookEvent,
            models::finance::WebhookOutcome,

            // --- Proposals ---
            models::proposal::ProposalStatus,
            models::proposal::ProposalLine,
            models::proposal::Proposal,
            models::proposal::ProposalDraft,
            models::proposal::ScheduleOutcome,
            handlers::proposals::SchedulePayload,

            // --- Subscriptions ---
            models::subscription::SubscriptionStatus,
            models::subscription::BillingPeriod,
            models::subscription::Subscription,
            services::subscription_service::RenewalOutcome,
            handlers::subscriptions::CreateSubscriptionPayload,
            handlers::subscriptions::RenewPayload,

            // --- Notifications ---
            models::notification::NotificationType,
            models::notification::NotificationKey,
            models::notification::UnseenNotification,
            models::notification::UnseenSummary,
            models::notification::NotificationChannel,
            handlers::notifications::MarkSeenPayload,
            handlers::notifications::MarkSeenResponse,
        )
    ),
    tags(
        (name = "CRM", description = "Clientes"),
        (name = "Loyalty", description = "Cartão Fidelidade"),
        (name = "Inventory", description = "Estoque e Movimentações"),
        (name = "Appointments", description = "Agenda e Finalização de Atendimentos"),
        (name = "Proposals", description = "Propostas (Orçamentos)"),
        (name = "Subscriptions", description = "Assinaturas Recorrentes"),
        (name = "Payments", description = "Cobranças PIX e Webhook"),
        (name = "Notifications", description = "Badge do Calendário")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
