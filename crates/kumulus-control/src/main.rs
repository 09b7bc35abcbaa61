//! Kumulus control service binary.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kumulus_control::{ControlConfig, ControlService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("kumulus_control=info".parse()?),
        )
        .init();

    info!("Kumulus control service starting");

    let config = match ControlConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    info!(
        listen_addr = %config.server.listen_addr,
        backend = ?config.database.backend,
        agent_port = config.agent.port,
        "configuration loaded"
    );

    ControlService::new(config).run().await?;
    Ok(())
}
