use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use log::{error, info, warn};
use tower_http::trace::TraceLayer;

use learnserver::core::config::AppConfig;
use learnserver::core::shared::state::AppState;
use learnserver::core::shared::utils::{create_conn, run_migrations};
use learnserver::learn::api::configure_learn_routes;
use learnserver::learn::questions::HttpQuestionSource;
use learnserver::learn::{CodeAllocator, LearnEngine, PgStore};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env()?;

    let pool = create_conn(&config.database).context("failed to create database pool")?;
    run_migrations(&pool).map_err(|e| anyhow::anyhow!("{}", e))?;
    info!("Database migrations applied");

    let engine = LearnEngine::with_codes(
        PgStore::new(pool),
        CodeAllocator::new(config.access_codes.max_attempts),
    );
    let mut state = AppState::new(engine);

    match &config.question_source {
        Some(source) => {
            let client = HttpQuestionSource::new(
                source.url.clone(),
                source.api_key.clone(),
                source.timeout,
            )
            .context("failed to build question source client")?;
            state = state.with_question_source(Arc::new(client));
            info!("Question source configured at {}", source.url);
        }
        None => warn!("QUESTION_SOURCE_URL not set, quiz generation disabled"),
    }

    let app = configure_learn_routes::<PgStore>()
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}
