use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tohyo::{
    aggregator::SummarizeOptions, api, auth, config::ServerConfig, db::Database, llm,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tohyo=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TOHYO...");

    let server_config = ServerConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());

    let db = Database::connect(
        &server_config.database_url,
        server_config.database_max_connections,
    )
    .await?;

    // Rooms still work without AI; only poll generation needs it
    let llm_config = llm::LlmConfig::from_env();
    let provider = match llm_config.build_provider() {
        Ok(provider) => {
            tracing::info!("LLM provider {} initialized", provider.name());
            Some(provider)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize LLM provider: {}. Poll generation will not be available.",
                e
            );
            None
        }
    };

    let state = Arc::new(
        AppState::new(db, provider).with_summarize_options(SummarizeOptions::from(&llm_config)),
    );
    let app = api::router(state, auth_config);

    let addr = server_config.socket_addr();
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
