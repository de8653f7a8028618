//! Secret Agent - Main Entry Point
//!
//! Exits with status 1 when the configuration is invalid. Store and
//! filesystem errors at runtime are retried, never fatal.

use agent_common::init_tracing;
use anyhow::Context;
use secret_agent::{AgentConfig, Controller};
use tracing::{Instrument, info, info_span};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::from_env().context("Invalid configuration")?;
    let tracing_config = config.tracing_config();
    init_tracing(&tracing_config)?;

    let span = info_span!("agent", service = %tracing_config.service_name, role = %config.role);
    async move {
        info!(version = env!("CARGO_PKG_VERSION"), "Secret agent starting");
        let controller = Controller::from_config(config)?;
        controller.run().await?;
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}
