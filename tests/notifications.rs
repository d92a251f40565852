mod common;

use agenda_backend::{
    common::error::AppError,
    models::{
        appointment::NewAppointment,
        auth::Principal,
        crm::Customer,
        notification::{NotificationChannel, NotificationKey, NotificationType, OutboundMessage},
    },
};
use chrono::{Duration, NaiveTime, Utc};
use common::{customer, owner, spawn_app, TestApp};
use uuid::Uuid;

async fn appointment_today(app: &TestApp, principal: &Principal, title: &str) -> Uuid {
    let today = Utc::now().date_naive();
    let start_at = today.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()).and_utc();
    app.state
        .appointment_service
        .create_appointment(
            principal,
            NewAppointment {
                customer_id: None,
                title: title.to_string(),
                start_at,
                end_at: start_at + Duration::hours(1),
                price: None,
                deposit_amount: None,
                proposal_id: None,
            },
        )
        .await
        .unwrap()
        .id
}

fn appointment_key(id: Uuid) -> NotificationKey {
    NotificationKey { notification_type: NotificationType::Appointment, notification_id: id }
}

#[tokio::test]
async fn badge_counts_only_unseen_items_of_the_day() {
    let app = spawn_app();
    let principal = owner();
    let first = appointment_today(&app, &principal, "Corte").await;
    let second = appointment_today(&app, &principal, "Escova").await;
    let today = Utc::now().date_naive();

    let summary = app.state.notification_service.unseen(&principal, today).await.unwrap();
    assert_eq!(summary.badge_count, 2);

    let marked = app.state.notification_service.mark_seen(&principal, &[appointment_key(first)]).await.unwrap();
    assert_eq!(marked, 1);

    let summary = app.state.notification_service.unseen(&principal, today).await.unwrap();
    assert_eq!(summary.badge_count, 1);
    assert_eq!(summary.items[0].key, appointment_key(second));

    // Outro dia não aparece
    let tomorrow = app
        .state
        .notification_service
        .unseen(&principal, today + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(tomorrow.badge_count, 0);
}

#[tokio::test]
async fn marking_twice_is_a_no_op() {
    let app = spawn_app();
    let principal = owner();
    let id = appointment_today(&app, &principal, "Corte").await;
    let keys = [appointment_key(id), appointment_key(id)];

    let first = app.state.notification_service.mark_seen(&principal, &keys).await.unwrap();
    let second = app.state.notification_service.mark_seen(&principal, &keys).await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 0);
}

#[tokio::test]
async fn seen_markers_belong_to_the_user() {
    let app = spawn_app();
    let principal = owner();
    let other = owner();
    let id = appointment_today(&app, &principal, "Corte").await;
    let today = Utc::now().date_naive();

    app.state.notification_service.mark_seen(&other, &[appointment_key(id)]).await.unwrap();

    let mine = app.state.notification_service.unseen(&principal, today).await.unwrap();
    assert_eq!(mine.badge_count, 1);
    let theirs = app.state.notification_service.unseen(&other, today).await.unwrap();
    assert_eq!(theirs.badge_count, 0);
}

#[tokio::test]
async fn completed_or_cancelled_appointments_leave_the_badge() {
    let app = spawn_app();
    let principal = owner();
    let id = appointment_today(&app, &principal, "Corte").await;
    app.state.appointment_service.cancel_appointment(&principal, id).await.unwrap();

    let summary = app.state.notification_service.unseen(&principal, Utc::now().date_naive()).await.unwrap();
    assert_eq!(summary.badge_count, 0);
}

fn message() -> OutboundMessage {
    OutboundMessage { subject: "Oi".to_string(), body: "Mensagem".to_string() }
}

#[tokio::test]
async fn deliver_once_sends_a_logical_message_a_single_time() {
    let app = spawn_app();
    let principal = owner();
    let client = customer(&app, &principal, Some("maria@exemplo.com")).await;
    let service = &app.state.notification_service;

    assert!(service.deliver_once(&principal, "lembrete:1", &client, &message()).await.unwrap());
    assert!(!service.deliver_once(&principal, "lembrete:1", &client, &message()).await.unwrap());
    assert!(service.deliver_once(&principal, "lembrete:2", &client, &message()).await.unwrap());

    let sent = app.sender.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].channel, NotificationChannel::Email);
}

#[tokio::test]
async fn failed_delivery_can_be_retried() {
    let app = spawn_app();
    let principal = owner();
    let client = customer(&app, &principal, Some("maria@exemplo.com")).await;
    let service = &app.state.notification_service;

    app.sender.fail(true);
    let failed = service.deliver_once(&principal, "lembrete:1", &client, &message()).await;
    assert!(matches!(failed, Err(AppError::UpstreamService(_))));

    app.sender.fail(false);
    assert!(service.deliver_once(&principal, "lembrete:1", &client, &message()).await.unwrap());
    assert_eq!(app.sender.sent().len(), 1);
}

#[tokio::test]
async fn whatsapp_is_used_when_there_is_no_email() {
    let app = spawn_app();
    let client = Customer {
        id: Uuid::new_v4(),
        business_id: Uuid::new_v4(),
        name: "João".to_string(),
        email: Some(String::new()),
        phone: Some("+5511999998888".to_string()),
        created_at: Utc::now(),
    };

    let channel = app.state.notification_service.send_to_customer(&client, &message()).await.unwrap();
    assert_eq!(channel, NotificationChannel::Whatsapp);

    let silent = Customer { phone: None, ..client };
    assert!(matches!(
        app.state.notification_service.send_to_customer(&silent, &message()).await,
        Err(AppError::InvalidState(_))
    ));
}
