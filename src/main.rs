use std::sync::Arc;
use std::time::Duration;

use shizi_backend_rust::config::Config;
use shizi_backend_rust::logging::init_tracing;
use shizi_backend_rust::session::SessionStore;
use shizi_backend_rust::state::AppState;

const PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    let addr = config.bind_addr();
    let idle_ttl = config.session_idle_ttl;
    let state = AppState::from_env(config);

    let purge = tokio::spawn(purge_idle_sessions(state.sessions(), idle_ttl));
    let app = shizi_backend_rust::build_app(state);

    tracing::info!(%addr, "shizi-backend listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "bind listener failed");
            return;
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown sequence");
    purge.abort();
    tracing::info!("Graceful shutdown complete");
}

async fn purge_idle_sessions(sessions: Arc<SessionStore>, idle_ttl: Duration) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        let removed = sessions.purge_idle(idle_ttl);
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "purged idle sessions");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
