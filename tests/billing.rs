mod common;

use std::sync::Arc;

use agenda_backend::{
    common::error::AppError,
    config::{AppState, Repositories, Settings},
    models::{
        auth::Principal,
        finance::{PaymentMethod, PixChargeStatus, PixWebhookEvent, TransactionStatus},
        subscription::{BillingPeriod, Subscription, SubscriptionStatus},
    },
    services::payment_service::{ChargeRequest, GatewayCharge, MockGateway, PaymentGateway},
};
use async_trait::async_trait;
use chrono::Utc;
use common::{customer, dec, owner, spawn_app, spawn_app_with, test_settings, RecordingSender, TestApp};
use hmac::{Hmac, Mac};
use rstest::rstest;
use sha2::Sha256;
use tokio::sync::Notify;

async fn subscription(app: &TestApp, principal: &Principal) -> Subscription {
    let client = customer(app, principal, Some("cliente@exemplo.com")).await;
    app.state
        .subscription_service
        .create(principal, client.id, "Plano Mensal Barba".to_string(), dec("89.90"), BillingPeriod::Monthly)
        .await
        .unwrap()
}

fn paid_event(external_id: &str) -> PixWebhookEvent {
    PixWebhookEvent { charge_id: external_id.to_string(), status: PixChargeStatus::Paid }
}

#[tokio::test]
async fn cash_renewal_books_completed_income_and_advances_cycle() {
    let app = spawn_app();
    let principal = owner();
    let created = subscription(&app, &principal).await;

    let outcome = app
        .state
        .subscription_service
        .renew(&principal, created.id, PaymentMethod::Cash)
        .await
        .unwrap();

    assert!(outcome.pix_charge.is_none());
    let income = outcome.transaction.unwrap();
    assert_eq!(income.status, TransactionStatus::Completed);
    assert_eq!(income.amount, dec("89.90"));
    assert_eq!(income.subscription_id, Some(created.id));

    let renewed = outcome.subscription;
    assert_eq!(renewed.status, SubscriptionStatus::Active);
    assert_eq!(renewed.last_payment_method, Some(PaymentMethod::Cash));
    assert!(renewed.next_billing_date > Utc::now());

    let ledger = app.state.subscription_service.transactions(&principal, created.id).await.unwrap();
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn pix_renewal_is_optimistic_until_webhook_confirms() {
    let app = spawn_app();
    let principal = owner();
    let created = subscription(&app, &principal).await;

    let outcome = app
        .state
        .subscription_service
        .renew(&principal, created.id, PaymentMethod::Pix)
        .await
        .unwrap();

    let charge = outcome.pix_charge.unwrap();
    assert_eq!(charge.status, PixChargeStatus::Pending);
    assert!(charge.external_id.starts_with("mock-"));
    assert!(charge.qr_svg.as_deref().is_some_and(|svg| svg.contains("<svg")));
    let pending = outcome.transaction.unwrap();
    assert_eq!(pending.status, TransactionStatus::Pending);
    assert_eq!(pending.pix_charge_id, Some(charge.id));
    assert_eq!(outcome.subscription.status, SubscriptionStatus::Active);

    let result = app.state.payment_service.handle_webhook(paid_event(&charge.external_id)).await.unwrap();
    assert!(result.applied);
    assert_eq!(result.charge.status, PixChargeStatus::Paid);
    assert!(result.charge.paid_at.is_some());

    let ledger = app.state.subscription_service.transactions(&principal, created.id).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, TransactionStatus::Completed);
}

#[tokio::test]
async fn repeated_webhook_is_a_no_op() {
    let app = spawn_app();
    let principal = owner();
    let created = subscription(&app, &principal).await;
    let charge = app
        .state
        .subscription_service
        .renew(&principal, created.id, PaymentMethod::Pix)
        .await
        .unwrap()
        .pix_charge
        .unwrap();

    let first = app.state.payment_service.handle_webhook(paid_event(&charge.external_id)).await.unwrap();
    let second = app.state.payment_service.handle_webhook(paid_event(&charge.external_id)).await.unwrap();
    assert!(first.applied);
    assert!(!second.applied);
    assert_eq!(second.charge.paid_at, first.charge.paid_at);

    // Expiração tardia não desfaz um pagamento
    let late = PixWebhookEvent { charge_id: charge.external_id.clone(), status: PixChargeStatus::Expired };
    let late = app.state.payment_service.handle_webhook(late).await.unwrap();
    assert!(!late.applied);
    assert_eq!(late.charge.status, PixChargeStatus::Paid);
}

#[tokio::test]
async fn unknown_charge_in_webhook_is_not_found() {
    let app = spawn_app();
    let result = app.state.payment_service.handle_webhook(paid_event("mock-desconhecida")).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn confirmed_payment_clears_failure_state() {
    let app = spawn_app();
    let principal = owner();
    let created = subscription(&app, &principal).await;
    let charge = app
        .state
        .subscription_service
        .renew(&principal, created.id, PaymentMethod::Pix)
        .await
        .unwrap()
        .pix_charge
        .unwrap();

    let failed = app.state.subscription_service.record_failed_payment(&principal, created.id).await.unwrap();
    assert_eq!(failed.status, SubscriptionStatus::PaymentFailed);

    app.state.payment_service.handle_webhook(paid_event(&charge.external_id)).await.unwrap();
    let current = app.state.subscription_service.find(&principal, created.id).await.unwrap();
    assert_eq!(current.status, SubscriptionStatus::Active);
    assert_eq!(current.failed_payments_count, 0);
}

#[rstest]
#[case(1, SubscriptionStatus::PaymentFailed)]
#[case(2, SubscriptionStatus::PaymentFailed)]
#[case(3, SubscriptionStatus::Suspended)]
#[case(4, SubscriptionStatus::Suspended)]
#[tokio::test]
async fn failed_payments_escalate(#[case] failures: i32, #[case] expected: SubscriptionStatus) {
    let app = spawn_app();
    let principal = owner();
    let created = subscription(&app, &principal).await;

    let mut current = created.clone();
    for _ in 0..failures {
        current = app.state.subscription_service.record_failed_payment(&principal, created.id).await.unwrap();
    }
    assert_eq!(current.failed_payments_count, failures);
    assert_eq!(current.status, expected);

    // Renovar zera a contagem
    let renewed = app
        .state
        .subscription_service
        .renew(&principal, created.id, PaymentMethod::CreditCard)
        .await
        .unwrap()
        .subscription;
    assert_eq!(renewed.failed_payments_count, 0);
    assert_eq!(renewed.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn cancelled_subscription_cannot_renew_or_fail() {
    let app = spawn_app();
    let principal = owner();
    let created = subscription(&app, &principal).await;
    let service = &app.state.subscription_service;

    let cancelled = service.cancel(&principal, created.id).await.unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    assert!(matches!(service.renew(&principal, created.id, PaymentMethod::Pix).await, Err(AppError::InvalidState(_))));
    assert!(matches!(service.record_failed_payment(&principal, created.id).await, Err(AppError::InvalidState(_))));
    assert!(matches!(service.cancel(&principal, created.id).await, Err(AppError::InvalidState(_))));
    assert!(service.transactions(&principal, created.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let app = spawn_app();
    let principal = owner();
    let client = customer(&app, &principal, None).await;

    let result = app
        .state
        .subscription_service
        .create(&principal, client.id, "Grátis".to_string(), dec("0"), BillingPeriod::Weekly)
        .await;
    assert!(matches!(result, Err(AppError::InvalidQuantity(_))));
}

struct DownGateway;

#[async_trait]
impl PaymentGateway for DownGateway {
    async fn create_charge(&self, _request: &ChargeRequest) -> Result<GatewayCharge, AppError> {
        Err(AppError::UpstreamService("provedor PIX fora do ar".to_string()))
    }
}

#[tokio::test]
async fn gateway_failure_leaves_subscription_untouched() {
    let sender = Arc::new(RecordingSender::default());
    let state = AppState::build(&test_settings(), None, Repositories::in_memory(), sender.clone(), Arc::new(DownGateway));
    let app = TestApp { state, sender };
    let principal = owner();
    let created = subscription(&app, &principal).await;

    let result = app.state.subscription_service.renew(&principal, created.id, PaymentMethod::Pix).await;
    assert!(matches!(result, Err(AppError::UpstreamService(_))));

    let current = app.state.subscription_service.find(&principal, created.id).await.unwrap();
    assert_eq!(current.next_billing_date, created.next_billing_date);
    assert!(current.last_payment_method.is_none());
    assert!(app.state.subscription_service.transactions(&principal, created.id).await.unwrap().is_empty());
}

/// Segura a emissão até o teste liberar.
#[derive(Default)]
struct HeldGateway {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl PaymentGateway for HeldGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<GatewayCharge, AppError> {
        self.entered.notify_one();
        self.release.notified().await;
        MockGateway.create_charge(request).await
    }
}

#[tokio::test]
async fn cancel_while_pix_is_issued_leaves_no_charge_or_income() {
    let gateway = Arc::new(HeldGateway::default());
    let sender = Arc::new(RecordingSender::default());
    let state = AppState::build(&test_settings(), None, Repositories::in_memory(), sender.clone(), gateway.clone());
    let app = TestApp { state, sender };
    let principal = owner();
    let created = subscription(&app, &principal).await;

    let subscriptions = app.state.subscription_service.clone();
    let subscription_id = created.id;
    let renewal =
        tokio::spawn(async move { subscriptions.renew(&principal, subscription_id, PaymentMethod::Pix).await });

    gateway.entered.notified().await;
    app.state.subscription_service.cancel(&principal, created.id).await.unwrap();
    gateway.release.notify_one();

    let result = renewal.await.unwrap();
    assert!(matches!(result, Err(AppError::InvalidState(_))));

    let current = app.state.subscription_service.find(&principal, created.id).await.unwrap();
    assert_eq!(current.status, SubscriptionStatus::Cancelled);
    assert_eq!(current.next_billing_date, created.next_billing_date);
    assert!(app.state.subscription_service.transactions(&principal, created.id).await.unwrap().is_empty());

    // A cobrança emitida no provedor nunca foi gravada: o webhook não acha nada
    let issued = MockGateway
        .create_charge(&ChargeRequest {
            amount: created.amount,
            payer_name: None,
            payer_phone: None,
            description: String::new(),
            reference: format!("subscription:{}:{}", created.id, created.next_billing_date.timestamp()),
        })
        .await
        .unwrap();
    let late = app.state.payment_service.handle_webhook(paid_event(&issued.charge_id)).await;
    assert!(matches!(late, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn concurrent_renewals_and_cancel_book_one_income_per_cycle() {
    let app = spawn_app();
    let principal = owner();
    let created = subscription(&app, &principal).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let subscriptions = app.state.subscription_service.clone();
        let subscription_id = created.id;
        handles.push(tokio::spawn(async move {
            if i == 5 {
                subscriptions.cancel(&principal, subscription_id).await.map(|_| false)
            } else {
                subscriptions.renew(&principal, subscription_id, PaymentMethod::Cash).await.map(|_| true)
            }
        }));
    }

    let mut renewals = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(true) => renewals += 1,
            Ok(false) => {}
            Err(e) => assert!(matches!(e, AppError::InvalidState(_))),
        }
    }

    let current = app.state.subscription_service.find(&principal, created.id).await.unwrap();
    assert_eq!(current.status, SubscriptionStatus::Cancelled);
    let ledger = app.state.subscription_service.transactions(&principal, created.id).await.unwrap();
    assert_eq!(ledger.len(), renewals);
}

#[tokio::test]
async fn overdue_charges_expire_and_cancel_pending_income() {
    let settings = Settings { pix_charge_ttl_hours: -1, ..test_settings() };
    let app = spawn_app_with(settings, Repositories::in_memory());
    let principal = owner();
    let created = subscription(&app, &principal).await;
    let charge = app
        .state
        .subscription_service
        .renew(&principal, created.id, PaymentMethod::Pix)
        .await
        .unwrap()
        .pix_charge
        .unwrap();

    let expired = app.state.payment_service.expire_overdue_charges(&principal, Utc::now()).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, charge.id);
    assert_eq!(expired[0].status, PixChargeStatus::Expired);

    let ledger = app.state.subscription_service.transactions(&principal, created.id).await.unwrap();
    assert_eq!(ledger[0].status, TransactionStatus::Cancelled);

    // Pagamento depois de expirada não é aplicado
    let late = app.state.payment_service.handle_webhook(paid_event(&charge.external_id)).await.unwrap();
    assert!(!late.applied);
    assert!(app.state.payment_service.expire_overdue_charges(&principal, Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn reminder_goes_to_customer_and_is_counted() {
    let app = spawn_app();
    let principal = owner();
    let created = subscription(&app, &principal).await;
    let charge = app
        .state
        .subscription_service
        .renew(&principal, created.id, PaymentMethod::Pix)
        .await
        .unwrap()
        .pix_charge
        .unwrap();

    let reminded = app.state.payment_service.send_charge_reminder(&principal, charge.id).await.unwrap();
    assert_eq!(reminded.reminders_sent, 1);
    let sent = app.sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "cliente@exemplo.com");

    app.state.payment_service.handle_webhook(paid_event(&charge.external_id)).await.unwrap();
    let after_payment = app.state.payment_service.send_charge_reminder(&principal, charge.id).await;
    assert!(matches!(after_payment, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn charges_are_private_to_their_business() {
    let app = spawn_app();
    let principal = owner();
    let created = subscription(&app, &principal).await;
    let charge = app
        .state
        .subscription_service
        .renew(&principal, created.id, PaymentMethod::Pix)
        .await
        .unwrap()
        .pix_charge
        .unwrap();

    let intruder = owner();
    assert!(matches!(
        app.state.payment_service.find_charge(&intruder, charge.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        app.state.subscription_service.renew(&intruder, created.id, PaymentMethod::Cash).await,
        Err(AppError::Forbidden(_))
    ));
}

fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[tokio::test]
async fn webhook_signature_is_enforced_only_when_configured() {
    let body = br#"{"chargeId":"mock-1","status":"paid"}"#;

    let open = spawn_app();
    assert!(open.state.payment_service.verify_signature(body, None).is_ok());

    let settings = Settings { payment_webhook_secret: Some("whsec".to_string()), ..test_settings() };
    let guarded = spawn_app_with(settings, Repositories::in_memory());
    let service = &guarded.state.payment_service;
    assert!(service.verify_signature(body, Some(&sign(body, "whsec"))).is_ok());
    assert!(matches!(service.verify_signature(body, None), Err(AppError::InvalidSignature)));
    assert!(matches!(
        service.verify_signature(body, Some(&sign(body, "outro"))),
        Err(AppError::InvalidSignature)
    ));
    assert!(matches!(service.verify_signature(body, Some("zz")), Err(AppError::InvalidSignature)));
}
