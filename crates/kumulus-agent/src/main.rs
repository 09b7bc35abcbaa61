//! Kumulus provisioning agent binary.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kumulus_agent::{AgentConfig, AgentService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("kumulus_agent=info".parse()?),
        )
        .init();

    info!("Kumulus provisioning agent starting");

    let config = match AgentConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    info!(
        listen_addr = %config.server.listen_addr,
        vm_ports = %config.ports.vm,
        "configuration loaded"
    );

    AgentService::new(config).run().await?;
    Ok(())
}
