// libs/payment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn payment_routes(state: Arc<AppConfig>) -> Router {
    // Customer and admin payment operations require authentication
    let protected_routes = Router::new()
        .route("/create-payment-intent", post(handlers::create_payment_intent))
        .route("/create-qr", post(handlers::create_qr_payment))
        .route("/history", get(handlers::get_payment_history))
        .route("/{payment_id}/status", get(handlers::get_payment_status))
        .route("/{payment_id}/confirm-qr", put(handlers::confirm_qr_payment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

/// Provider callbacks; no bearer auth, each handler verifies its signature.
pub fn webhook_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/webhook", post(handlers::stripe_webhook))
        .route("/webhook-qr", post(handlers::qr_webhook))
        .with_state(state)
}
