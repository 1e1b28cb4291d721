use paylink_backend::api::{self, AppState};
use paylink_backend::config::Config;
use paylink_backend::database;
use paylink_backend::payments::registry::ProviderRegistry;
use paylink_backend::settlement::SettlementOrchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paylink_backend=info,tower_http=info".into()),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting Paylink settlement backend");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!(
        "Enabled providers: {}",
        config.payments.enabled_providers.join(", ")
    );

    // Connect to Postgres
    let pool = database::init_pool(
        &config.database.url,
        Some(database::PoolConfig {
            max_connections: config.database.max_connections,
            ..Default::default()
        }),
    )
    .await?;
    database::health_check(&pool).await?;

    // Build provider registry and orchestrator
    let registry = Arc::new(ProviderRegistry::from_config(&config.payments));
    let orchestrator = Arc::new(SettlementOrchestrator::new(
        pool.clone(),
        registry.clone(),
        config.payments.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        pool: pool.clone(),
        registry,
        orchestrator,
    };
    let app = api::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
