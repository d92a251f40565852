//src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Json, Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

use agenda_backend::{
    config::{AppState, Settings},
    docs::ApiDoc,
    handlers,
    middleware::auth::auth_guard,
};

#[tokio::main]
async fn main() {
    // RUST_LOG sobrescreve o filtro padrão
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agenda_backend=info")))
        .with_target(false)
        .compact()
        .init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let settings = Settings::from_env().expect("Configuração inválida.");

    let app_state = AppState::new(&settings)
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    app_state
        .migrate()
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    let crm_routes = Router::new()
        .route("/customers", post(handlers::crm::create_customer))
        .route("/customers/{customer_id}", get(handlers::crm::get_customer))
        .route("/customers/{customer_id}/loyalty", get(handlers::crm::get_loyalty_card))
        .route(
            "/customers/{customer_id}/loyalty/stamps-required",
            put(handlers::crm::set_stamps_required),
        );

    let inventory_routes = Router::new()
        .route("/items"
               ,post(handlers::inventory::create_item)
               .get(handlers::inventory::list_items)
        )
        .route("/items/low-stock", get(handlers::inventory::low_stock_items))
        .route("/items/{item_id}/movements"
               ,post(handlers::inventory::apply_movement)
               .get(handlers::inventory::list_movements)
        );

    let appointment_routes = Router::new()
        .route("/", post(handlers::appointments::create_appointment))
        .route("/{appointment_id}", get(handlers::appointments::get_appointment))
        .route("/{appointment_id}/complete", post(handlers::appointments::complete_appointment))
        .route("/{appointment_id}/cancel", post(handlers::appointments::cancel_appointment))
        .route("/{appointment_id}/transactions", get(handlers::appointments::list_transactions));

    let proposal_routes = Router::new()
        .route("/"
               ,post(handlers::proposals::create_proposal)
               .get(handlers::proposals::list_proposals)
        )
        .route("/expire-overdue", post(handlers::proposals::expire_overdue))
        .route("/{proposal_id}"
               ,get(handlers::proposals::get_proposal)
               .delete(handlers::proposals::delete_proposal)
        )
        .route("/{proposal_id}/send", post(handlers::proposals::send_proposal))
        .route("/{proposal_id}/view", post(handlers::proposals::mark_viewed))
        .route("/{proposal_id}/accept", post(handlers::proposals::accept_proposal))
        .route("/{proposal_id}/confirm", post(handlers::proposals::confirm_proposal))
        .route("/{proposal_id}/reject", post(handlers::proposals::reject_proposal))
        .route("/{proposal_id}/pause", post(handlers::proposals::pause_proposal))
        .route("/{proposal_id}/resume", post(handlers::proposals::resume_proposal))
        .route("/{proposal_id}/cancel", post(handlers::proposals::cancel_proposal))
        .route("/{proposal_id}/schedule", post(handlers::proposals::schedule_proposal));

    let subscription_routes = Router::new()
        .route("/", post(handlers::subscriptions::create_subscription))
        .route("/{subscription_id}", get(handlers::subscriptions::get_subscription))
        .route("/{subscription_id}/renew", post(handlers::subscriptions::renew_subscription))
        .route("/{subscription_id}/cancel", post(handlers::subscriptions::cancel_subscription))
        .route("/{subscription_id}/failed-payment", post(handlers::subscriptions::record_failed_payment))
        .route("/{subscription_id}/transactions", get(handlers::subscriptions::list_transactions));

    let payment_routes = Router::new()
        .route("/charges/expire-overdue", post(handlers::payments::expire_overdue_charges))
        .route("/charges/{charge_id}", get(handlers::payments::get_charge))
        .route("/charges/{charge_id}/reminder", post(handlers::payments::send_reminder));

    let notification_routes = Router::new()
        .route("/unseen", get(handlers::notifications::unseen))
        .route("/seen", post(handlers::notifications::mark_seen));

    // Tudo abaixo exige Bearer token
    let protected = Router::new()
        .nest("/crm", crm_routes)
        .nest("/inventory", inventory_routes)
        .nest("/appointments", appointment_routes)
        .nest("/proposals", proposal_routes)
        .nest("/subscriptions", subscription_routes)
        .nest("/payments", payment_routes)
        .nest("/notifications", notification_routes)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/payments/webhook", post(handlers::payments::pix_webhook))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", protected)
        .with_state(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", settings.bind_addr);
    axum::serve(listener, app)
        .await
        .expect("Erro no servidor Axum");
}
