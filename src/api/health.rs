use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub database: bool,
    pub providers: Vec<String>,
}

pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let database = crate::database::health_check(&state.pool).await.is_ok();

    let providers = state
        .registry
        .provider_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let response = HealthResponse {
        status: if database { "healthy" } else { "degraded" }.to_string(),
        version,
        environment: state.config.server.environment.clone(),
        database,
        providers,
    };

    Ok(Json(response))
}
