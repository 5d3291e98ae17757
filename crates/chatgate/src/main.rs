use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use chatgate_cohere::CohereClient;
use chatgate_core::{config::Config, session::SessionStore};
use chatgate_http::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Arc::new(Config::load().context("failed to load configuration")?);
    chatgate_core::logging::init("chatgate", cfg.log_json)?;

    let model = Arc::new(CohereClient::new(
        cfg.cohere_api_key.clone(),
        cfg.cohere_base_url.clone(),
        cfg.cohere_model.clone(),
        cfg.upstream_timeout,
    )?);

    let state = Arc::new(AppState::new(cfg.clone(), model));

    if cfg.session_idle_ttl.is_some() {
        tokio::spawn(sweep_sessions(
            state.sessions.clone(),
            cfg.session_sweep_interval,
        ));
    }

    let listener = TcpListener::bind(cfg.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_address))?;

    chatgate_http::serve(listener, state, shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("chatgate stopped");
    Ok(())
}

/// Periodically drop sessions idle past the configured TTL.
async fn sweep_sessions(sessions: Arc<SessionStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let evicted = sessions.sweep_idle().await;
        if evicted > 0 {
            let remaining = sessions.len().await;
            debug!(evicted, remaining, "idle sessions swept");
        }
    }
}

/// Resolves on SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining connections");
}
