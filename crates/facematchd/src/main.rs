use std::sync::Arc;

use anyhow::{Context, Result};
use facematch_core::catalog::{DEFAULT_DISTANCE_METRIC, DEFAULT_MODEL, SKIP_DETECTOR};
use facematch_core::{OnnxMatcher, VerifyRequest};
use image::RgbImage;
use tokio::signal;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod decode;
mod engine;
mod error;
mod options;
mod pipeline;
mod response;


use api::{AppState, RouterOptions};
use config::Config;
use engine::EngineHandle;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facematchd starting");

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        intra_threads = config.intra_threads,
        queue_depth = config.queue_depth,
        max_body_bytes = config.max_body_bytes,
        "configuration loaded"
    );

    let matcher = OnnxMatcher::new(&config.model_dir, config.intra_threads);
    let engine = engine::spawn_engine(matcher, config.queue_depth)
        .context("failed to start verification engine")?;

    if config.warmup {
        warm_up(&engine).await;
    }

    let state = Arc::new(AppState {
        verifier: Arc::new(engine),
    });
    let app = api::create_router(
        state,
        RouterOptions {
            cors: config.cors,
            max_body_bytes: config.max_body_bytes,
        },
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "facematchd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facematchd shutting down");
    Ok(())
}

/// Load the default model by comparing two blank images. Failure is not fatal.
async fn warm_up(engine: &EngineHandle) {
    let blank = RgbImage::new(100, 100);
    let request = VerifyRequest {
        model_name: DEFAULT_MODEL.to_string(),
        distance_metric: DEFAULT_DISTANCE_METRIC.to_string(),
        detector_backend: SKIP_DETECTOR.to_string(),
        enforce_detection: false,
    };

    tracing::info!(model = DEFAULT_MODEL, "warming up");
    match engine.submit(blank.clone(), blank, request).await {
        Ok(result) => tracing::info!(time = result.time, "warm-up complete"),
        Err(e) => tracing::warn!(
            error = %e,
            "warm-up failed; the model will load on the first request"
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
