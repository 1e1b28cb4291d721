//! HTTP surface of the settlement core: health and inbound webhooks.

pub mod health;
pub mod webhooks;

use crate::config::Config;
use crate::payments::registry::ProviderRegistry;
use crate::settlement::SettlementOrchestrator;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: sqlx::PgPool,
    pub registry: Arc<ProviderRegistry>,
    pub orchestrator: Arc<SettlementOrchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/webhooks/payments/:provider", post(webhooks::receive_webhook))
        .route(
            "/webhooks/payments/:provider/test",
            post(webhooks::test_webhook),
        )
        .with_state(state)
}
