//! Premia application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Set up tracing
//! 3. Build the language model, pricing and recommendation clients
//! 4. Start the idle-session sweeper
//! 5. Serve the axum API until Ctrl-C

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use premia_api::state::AppState;
use premia_chat::{HttpPricingService, HttpRecommendationService, OllamaGateway, TurnController};
use premia_core::PremiaConfig;

use crate::cli::CliArgs;

/// Periodically drop conversations that have been idle past the TTL.
async fn session_sweeper(controller: Arc<TurnController>, every: Duration) {
    tracing::info!(interval_secs = every.as_secs(), "Session sweeper started");

    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        let evicted = controller.evict_expired();
        tracing::debug!(
            evicted,
            active = controller.active_sessions(),
            "Session sweep finished"
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // The file's log level seeds the filter, so peek at it before tracing
    // is up. The full load below reports any problem with the file.
    let config_file = args.resolve_config_path();
    let file_level = PremiaConfig::load(&config_file)
        .map(|c| c.general.log_level)
        .unwrap_or_else(|_| "info".to_string());
    let log_level = args.resolve_log_level(&file_level);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Premia v{}", env!("CARGO_PKG_VERSION"));

    let mut config = PremiaConfig::load_or_default(&config_file);
    config.general.port = args.resolve_port(config.general.port);
    config.general.bind_address = args.resolve_bind(&config.general.bind_address);
    config.general.log_level = log_level;

    if args.write_config {
        config.save(&config_file)?;
        return Ok(());
    }

    // Outbound clients.
    let gateway = Arc::new(OllamaGateway::from_config(&config.llm)?);
    let pricing = Arc::new(HttpPricingService::from_config(&config.pricing)?);
    let recommendations = Arc::new(HttpRecommendationService::from_config(
        &config.recommendation,
    )?);
    tracing::info!(
        llm = %gateway.endpoint(),
        model = %config.llm.model,
        pricing = %config.pricing.url,
        recommendation = %config.recommendation.url,
        policy = ?config.chat.completion_policy,
        "Downstream services configured"
    );

    let controller = Arc::new(TurnController::from_config(
        &config,
        gateway,
        pricing,
        recommendations,
    ));

    // === Background tasks ===

    match config.session.ttl() {
        Some(ttl) if config.session.sweep_interval_secs > 0 => {
            tracing::info!(ttl_secs = ttl.as_secs(), "Idle session eviction enabled");
            tokio::spawn(session_sweeper(
                Arc::clone(&controller),
                Duration::from_secs(config.session.sweep_interval_secs),
            ));
        }
        _ => tracing::info!("Idle session eviction disabled"),
    }

    // === API server ===

    let port = config.general.port;
    let state = AppState::new(config, controller);
    if let Err(e) = premia_api::start_server(state, shutdown_signal()).await {
        tracing::error!(error = %e, "API server stopped");
        tracing::error!("Try: PREMIA_PORT={} premia", port.saturating_add(1));
        return Err(e.into());
    }

    tracing::info!("Premia stopped");
    Ok(())
}
