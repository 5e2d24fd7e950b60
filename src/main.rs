//! TalkKin Cache - cache warm-up tool
//!
//! Opens the durable cache file, fetches the reference data the app needs at
//! launch (supported languages, plus voices for any language codes given as
//! arguments) and prints the resulting cache statistics.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use talkkin_cache::{ApiService, CacheService, Config, FileStore, ReqwestTransport};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the durable tier and build the cache
/// 4. Start background TTL cleanup task
/// 5. Warm the cache, unless interrupted by SIGINT/SIGTERM
/// 6. Print statistics and stop the cleanup task
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talkkin_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: base_url={}, default_ttl={}ms, max_memory={}B, cache_file={}",
        config.api_base_url, config.default_ttl_ms, config.max_memory_size, config.cache_file
    );

    let durable = Arc::new(FileStore::open(&config.cache_file).await);
    let cache = CacheService::open(&config, durable).await;
    cache.start_cleanup();

    let api = ApiService::new(&config, cache.clone(), Arc::new(ReqwestTransport::new()));
    let languages: Vec<String> = std::env::args().skip(1).collect();

    tokio::select! {
        _ = warm_up(&api, &languages) => {}
        _ = shutdown_signal() => {
            warn!("Warm-up interrupted");
        }
    }

    let stats = serde_json::json!({
        "cache": cache.stats().await,
        "requests": api.stats(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("Failed to render statistics")?
    );

    cache.shutdown();
    info!("Shutdown complete");
    Ok(())
}

async fn warm_up(api: &ApiService, languages: &[String]) {
    let supported = api.get_supported_languages().await;
    match (&supported.data, &supported.error) {
        (Some(list), _) => info!(
            "Supported languages: {} (cached={})",
            list.len(),
            supported.cached
        ),
        (None, error) => warn!("Could not load supported languages: {:?}", error),
    }

    for code in languages {
        let voices = api.get_available_voices(code).await;
        match voices.data {
            Some(list) => info!("Voices for {}: {}", code, list.len()),
            None => warn!("Could not load voices for {}: {:?}", code, voices.error),
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
