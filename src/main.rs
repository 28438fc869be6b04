use std::env::var;

use ldapauth::config::Configuration;
use ldapauth::{AppState, app, telemetry};
use tokio::net::TcpListener;
use tokio::signal;

const CONFIG_PATH: &str = "CONFIG_PATH";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::setup_logging();

    let config = Configuration::default()
        .path(var(CONFIG_PATH).unwrap_or_default())
        .read()?;

    if let Err(err) = config.ldap.server.validate() {
        tracing::warn!(error = %err, "every login will fail");
    }

    let mut state = AppState::new(config.clone());
    match telemetry::setup_metrics_recorder() {
        Ok(handle) => state = state.metrics(handle),
        Err(err) => {
            tracing::error!(error = %err, "cannot install metrics recorder")
        },
    }

    let listener = TcpListener::bind(&config.address).await?;
    tracing::info!(
        name = %config.name,
        address = %listener.local_addr()?,
        "server started"
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM")
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
