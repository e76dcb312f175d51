use policy_assistant::{api, config, logging, pipeline::PolicyAssistant};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    // `.env` must be loaded before the subscriber reads RUST_LOG.
    let config = config::load();
    logging::init_tracing();
    let config = match config {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(error = %error, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let assistant = match PolicyAssistant::from_config(&config).await {
        Ok(assistant) => assistant,
        Err(error) => {
            tracing::error!(error = %error, "Failed to initialize policy assistant");
            return ExitCode::FAILURE;
        }
    };
    let app = api::create_router(Arc::new(assistant));

    let (listener, port) = match bind_listener(config.server_port).await {
        Ok(bound) => bound,
        Err(error) => {
            tracing::error!(error = %error, "Failed to bind listener");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    if let Err(error) = axum::serve(listener, app).await {
        tracing::error!(error = %error, "Server terminated");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn bind_listener(server_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}
