//! Standalone SAML 2.0 Identity Provider server.
//!
//! Serves the `/saml/*` endpoints for a fixed set of service providers read
//! from a JSON registry at startup.

mod config;
mod logging;
mod principal;

use axum::Router;
use config::Config;
use principal::{forward_principal, PrincipalHeader};
use saml_idp::{
    saml_router, InMemoryServiceProviderStore, SamlState, StaticCredentialProvider,
};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("FATAL: Configuration error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    tracing::info!(
        entity_id = %config.options.entity_id,
        base_url = %config.options.base_url,
        "Starting SAML IdP"
    );

    let app = match build_app(&config) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize SAML IdP");
            std::process::exit(1);
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %addr, "Listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server shutdown complete");
}

fn build_app(config: &Config) -> Result<Router, config::ConfigError> {
    let credentials = config.load_signing_credentials()?;
    let providers = config.load_service_providers()?;
    tracing::info!(count = providers.len(), "Loaded service provider registry");

    let state = SamlState::in_memory(
        config.options.clone(),
        Arc::new(InMemoryServiceProviderStore::with_providers(providers)),
        Arc::new(StaticCredentialProvider::new(credentials)),
    );

    let router = saml_router(state);
    Ok(match &config.principal_header {
        Some(header) => {
            tracing::warn!(header = %header, "Trusting principal header from upstream proxy");
            router.layer(axum::middleware::from_fn_with_state(
                PrincipalHeader(Arc::from(header.as_str())),
                forward_principal,
            ))
        }
        None => router,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
