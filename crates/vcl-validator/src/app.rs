//! Service wiring: routes, middleware, signals and shutdown

use crate::config::Cli;
use crate::signal::shutdown_signal;
use crate::sockets::{provision_placeholder_sockets, HAPROXY_SOCKETS};
use crate::validate::Validation;
use crate::validator::ValidatorCommand;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use vcl_validator_core::middleware::{AccessLog, BodyLimit, BodyLimitConfig, RequestId};
use vcl_validator_core::{Health, Method, Server, ServerConfig, ServerState, ShutdownHandle};

/// Value of the `service` field on every log line
pub const SERVICE_NAME: &str = "vcl-validator";

pub const VALIDATE_PATH: &str = "/validate-vcl";
pub const HEALTH_PATH: &str = "/healthz";

/// Routes and middleware of the service
pub fn build_state(config: ServerConfig, validation: Arc<Validation>, health: &Health) -> Result<ServerState> {
    let max_body_size = config.max_body_size;
    let state = ServerState::new(config)
        .with(AccessLog::new())
        .with(RequestId::default())
        .with(BodyLimit::new(BodyLimitConfig::new(max_body_size)))
        .route(Method::Post, VALIDATE_PATH, validation.handler())?
        .route(Method::Get, HEALTH_PATH, health.handler())?;
    Ok(state)
}

/// Report not ready, keep serving for `delay`, then stop the server
pub async fn shutdown_after_grace(health: Health, delay: Duration, shutdown: ShutdownHandle) {
    health.set_ready(false);
    tracing::info!(
        delay_ms = delay.as_millis() as u64,
        "sleeping before shutting down the server"
    );
    tokio::time::sleep(delay).await;
    shutdown.trigger();
}

/// Run the service until a termination signal has been handled
pub async fn run(cli: &Cli, config: ServerConfig) -> Result<()> {
    if cli.placeholder_sockets {
        let created = provision_placeholder_sockets(&HAPROXY_SOCKETS)?;
        tracing::info!(created, "placeholder sockets ready");
    }

    let health = Health::new();
    let validation = Arc::new(Validation::new(ValidatorCommand::varnishd()));
    let shutdown_delay = config.shutdown_delay;
    let drain_timeout = config.drain_timeout;
    let listen = config.listen;

    let server = Server::new(build_state(config, validation, &health)?);
    let listener = server.bind()?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(
        async move {
            match shutdown_signal().await {
                Ok(name) => tracing::info!(signal = name, "received signal"),
                Err(e) => {
                    tracing::error!(error = %e, "unable to install signal handlers");
                    return;
                }
            }

            shutdown_after_grace(health, shutdown_delay, shutdown).await;
        }
        .in_current_span(),
    );

    tracing::info!(addr = %listen, "starting server");
    server.serve(listener).await?;

    if server.drain(drain_timeout).await {
        tracing::info!("server stopped");
    } else {
        tracing::warn!(
            active = server.active_connections(),
            "drain timeout reached, exiting with open connections"
        );
    }

    Ok(())
}
