//! Binary entry point for the relay service.
//!
//! Invocation: `relay-service <bind-port> [external-redirect]`.

use std::process::ExitCode;

use clap::Parser;
use relay_service::config::RelayConfig;

#[tokio::main]
async fn main() -> ExitCode {
    relay_service::observability::install_tracing("relay_service=info,tower_http=info");

    let config = RelayConfig::parse();
    tracing::info!(?config, "starting relay-service");

    match relay_service::run(config, relay_service::shutdown::default_shutdown_signal()).await {
        Ok(()) => {
            tracing::info!("shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err:?}");
            ExitCode::FAILURE
        }
    }
}
