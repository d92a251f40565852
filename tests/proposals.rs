mod common;

use agenda_backend::{
    common::error::AppError,
    config::Repositories,
    models::{
        auth::Principal,
        proposal::{Proposal, ProposalDraft, ProposalLine, ProposalStatus},
    },
};
use chrono::{Duration, Utc};
use common::{customer, dec, owner, spawn_app, spawn_app_with, test_settings, TestApp};
use uuid::Uuid;

fn draft(customer_id: Option<Uuid>) -> ProposalDraft {
    ProposalDraft {
        customer_id,
        title: "  Pacote noiva  ".to_string(),
        services: vec![ProposalLine {
            description: "Maquiagem".to_string(),
            quantity: dec("2"),
            unit_price: dec("100"),
        }],
        discount_percentage: dec("10"),
        deposit_percentage: dec("50"),
        valid_until: None,
    }
}

async fn proposal_for(app: &TestApp, principal: &Principal) -> Proposal {
    let client = customer(app, principal, Some("noiva@exemplo.com")).await;
    app.state.proposal_service.create(principal, draft(Some(client.id))).await.unwrap()
}

#[tokio::test]
async fn amounts_are_computed_on_the_server() {
    let app = spawn_app();
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;

    assert_eq!(proposal.status, ProposalStatus::Pending);
    assert_eq!(proposal.title, "Pacote noiva");
    assert_eq!(proposal.total_amount, dec("200.00"));
    assert_eq!(proposal.final_amount, dec("180.00"));
    assert_eq!(proposal.deposit_amount, dec("90.00"));
}

#[tokio::test]
async fn out_of_range_percentage_is_rejected() {
    let app = spawn_app();
    let principal = owner();
    let mut invalid = draft(None);
    invalid.discount_percentage = dec("120");

    let result = app.state.proposal_service.create(&principal, invalid).await;
    assert!(matches!(result, Err(AppError::InvalidQuantity(_))));
}

#[tokio::test]
async fn oversized_line_is_rejected_without_storing() {
    let app = spawn_app();
    let principal = owner();
    let mut oversized = draft(None);
    oversized.services[0].quantity = dec("10000000000000000000");
    oversized.services[0].unit_price = dec("10000000000000000000");

    let result = app.state.proposal_service.create(&principal, oversized).await;
    assert!(matches!(result, Err(AppError::InvalidQuantity(_))));
    assert!(app.state.proposal_service.list(&principal).await.unwrap().is_empty());
}

#[tokio::test]
async fn send_delivers_once_and_throttles_resend() {
    let app = spawn_app();
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;

    let sent = app.state.proposal_service.send(&principal, proposal.id).await.unwrap();
    assert_eq!(sent.status, ProposalStatus::Sent);
    assert!(sent.sent_at.is_some());
    assert_eq!(sent.sent_at, sent.last_sent_at);
    assert_eq!(app.sender.sent().len(), 1);
    assert_eq!(app.sender.sent()[0].recipient, "noiva@exemplo.com");

    let again = app.state.proposal_service.send(&principal, proposal.id).await;
    assert!(matches!(again, Err(AppError::SendThrottled { retry_after_secs }) if retry_after_secs > 0));
    assert_eq!(app.sender.sent().len(), 1);
}

#[tokio::test]
async fn resend_after_cooldown_keeps_first_sent_at() {
    let settings = agenda_backend::config::Settings { proposal_send_cooldown_minutes: 0, ..test_settings() };
    let app = spawn_app_with(settings, Repositories::in_memory());
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;

    let first = app.state.proposal_service.send(&principal, proposal.id).await.unwrap();
    let second = app.state.proposal_service.send(&principal, proposal.id).await.unwrap();

    assert_eq!(second.sent_at, first.sent_at);
    assert!(second.last_sent_at >= first.last_sent_at);
    assert_eq!(app.sender.sent().len(), 2);
}

#[tokio::test]
async fn failed_delivery_reverts_the_send() {
    let app = spawn_app();
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;
    app.sender.fail(true);

    let result = app.state.proposal_service.send(&principal, proposal.id).await;
    assert!(matches!(result, Err(AppError::UpstreamService(_))));

    let current = app.state.proposal_service.find(&principal, proposal.id).await.unwrap();
    assert_eq!(current.status, ProposalStatus::Pending);
    assert!(current.sent_at.is_none());
    assert!(current.last_sent_at.is_none());

    // Sem trava pendurada: assim que o provedor volta, o envio passa
    app.sender.fail(false);
    let sent = app.state.proposal_service.send(&principal, proposal.id).await.unwrap();
    assert_eq!(sent.status, ProposalStatus::Sent);
}

#[tokio::test]
async fn proposal_without_contact_cannot_be_sent() {
    let app = spawn_app();
    let principal = owner();
    let client = customer(&app, &principal, None).await;
    let proposal = app.state.proposal_service.create(&principal, draft(Some(client.id))).await.unwrap();

    let result = app.state.proposal_service.send(&principal, proposal.id).await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
    let current = app.state.proposal_service.find(&principal, proposal.id).await.unwrap();
    assert_eq!(current.status, ProposalStatus::Pending);
}

#[tokio::test]
async fn funnel_moves_forward_and_rejects_illegal_edges() {
    let app = spawn_app();
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;
    let service = &app.state.proposal_service;

    // Pendente não pode ser visualizada
    assert!(matches!(service.mark_viewed(&principal, proposal.id).await, Err(AppError::InvalidState(_))));

    service.send(&principal, proposal.id).await.unwrap();
    let viewed = service.mark_viewed(&principal, proposal.id).await.unwrap();
    assert_eq!(viewed.status, ProposalStatus::Viewed);
    assert!(viewed.viewed_at.is_some());

    let paused = service.pause(&principal, proposal.id).await.unwrap();
    assert_eq!(paused.status, ProposalStatus::Paused);
    let resumed = service.resume(&principal, proposal.id).await.unwrap();
    assert_eq!(resumed.status, ProposalStatus::Sent);

    let accepted = service.accept(&principal, proposal.id).await.unwrap();
    assert_eq!(accepted.status, ProposalStatus::Accepted);
    assert!(accepted.accepted_at.is_some());

    // Aceita não volta para enviada nem pode ser recusada
    assert!(matches!(service.send(&principal, proposal.id).await, Err(AppError::InvalidState(_))));
    assert!(matches!(service.reject(&principal, proposal.id).await, Err(AppError::InvalidState(_))));

    let confirmed = service.confirm(&principal, proposal.id).await.unwrap();
    assert_eq!(confirmed.status, ProposalStatus::Confirmed);
    assert_eq!(confirmed.accepted_at, accepted.accepted_at);
    assert!(matches!(service.cancel(&principal, proposal.id).await, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn rejected_proposal_is_terminal() {
    let app = spawn_app();
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;
    let service = &app.state.proposal_service;

    service.send(&principal, proposal.id).await.unwrap();
    service.reject(&principal, proposal.id).await.unwrap();
    assert!(matches!(service.accept(&principal, proposal.id).await, Err(AppError::InvalidState(_))));
    assert!(matches!(service.resume(&principal, proposal.id).await, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn double_schedule_creates_a_single_appointment() {
    let app = spawn_app();
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;
    let service = &app.state.proposal_service;
    service.confirm(&principal, proposal.id).await.unwrap();

    let start_at = Utc::now() + Duration::days(3);
    let end_at = start_at + Duration::hours(2);
    let first = service.schedule_from_proposal(&principal, proposal.id, start_at, end_at).await.unwrap();
    let second = service.schedule_from_proposal(&principal, proposal.id, start_at, end_at).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.appointment.id, second.appointment.id);
    assert_eq!(first.appointment.price, Some(dec("180.00")));
    assert_eq!(first.appointment.deposit_amount, Some(dec("90.00")));
    assert_eq!(first.appointment.proposal_id, Some(proposal.id));
    assert_eq!(second.proposal.appointment_id, Some(first.appointment.id));
}

#[tokio::test]
async fn concurrent_schedule_clicks_produce_one_appointment() {
    let app = spawn_app();
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;
    app.state.proposal_service.confirm(&principal, proposal.id).await.unwrap();

    let start_at = Utc::now() + Duration::days(1);
    let proposal_id = proposal.id;
    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = app.state.proposal_service.clone();
        handles.push(tokio::spawn(async move {
            service
                .schedule_from_proposal(&principal, proposal_id, start_at, start_at + Duration::hours(1))
                .await
        }));
    }

    let mut created = 0;
    let mut ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.created {
            created += 1;
        }
        ids.push(outcome.appointment.id);
    }
    assert_eq!(created, 1);
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn pending_proposal_cannot_be_scheduled() {
    let app = spawn_app();
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;
    let start_at = Utc::now() + Duration::days(1);

    let result = app
        .state
        .proposal_service
        .schedule_from_proposal(&principal, proposal.id, start_at, start_at + Duration::hours(1))
        .await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn scheduled_proposal_cannot_be_deleted_or_moved() {
    let app = spawn_app();
    let principal = owner();
    let proposal = proposal_for(&app, &principal).await;
    let service = &app.state.proposal_service;
    service.confirm(&principal, proposal.id).await.unwrap();
    let start_at = Utc::now() + Duration::days(1);
    service
        .schedule_from_proposal(&principal, proposal.id, start_at, start_at + Duration::hours(1))
        .await
        .unwrap();

    assert!(matches!(service.delete(&principal, proposal.id).await, Err(AppError::InvalidState(_))));
    let other = proposal_for(&app, &principal).await;
    service.delete(&principal, other.id).await.unwrap();
    assert!(matches!(service.find(&principal, other.id).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn overdue_proposals_expire_in_one_sweep() {
    let app = spawn_app();
    let principal = owner();
    let client = customer(&app, &principal, Some("noiva@exemplo.com")).await;
    let service = &app.state.proposal_service;

    let mut overdue = draft(Some(client.id));
    overdue.valid_until = Some(Utc::now() - Duration::days(1));
    let overdue = service.create(&principal, overdue).await.unwrap();

    let mut fresh = draft(Some(client.id));
    fresh.valid_until = Some(Utc::now() + Duration::days(7));
    let fresh = service.create(&principal, fresh).await.unwrap();

    let expired = service.expire_overdue(&principal, Utc::now()).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, overdue.id);
    assert_eq!(expired[0].status, ProposalStatus::Expired);

    assert_eq!(service.find(&principal, fresh.id).await.unwrap().status, ProposalStatus::Pending);
    // Segunda varredura não tem o que fazer
    assert!(service.expire_overdue(&principal, Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn proposals_are_private_to_their_business() {
    let app = spawn_app();
    let principal = owner();
    let intruder = owner();
    let proposal = proposal_for(&app, &principal).await;

    assert!(matches!(
        app.state.proposal_service.find(&intruder, proposal.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        app.state.proposal_service.send(&intruder, proposal.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(app.state.proposal_service.list(&intruder).await.unwrap().is_empty());
}
