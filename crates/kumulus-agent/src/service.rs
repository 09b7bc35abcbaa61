//! Service lifecycle management.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{self, AgentState};
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::housekeeping;
use crate::ports::LocalPortProbe;
use crate::provisioner::Provisioner;
use crate::runtime::DockerCli;

/// The provisioning agent service.
pub struct AgentService {
    config: AgentConfig,
    cancel: CancellationToken,
}

impl AgentService {
    /// Create a new agent service with the given configuration.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Serve the agent API until a shutdown signal arrives.
    pub async fn run(&self) -> AgentResult<()> {
        let provisioner = Arc::new(Provisioner::new(
            Arc::new(DockerCli::new(&self.config.docker.binary)),
            Arc::new(LocalPortProbe),
            self.config.docker.clone(),
            self.config.ports.clone(),
        ));
        info!(docker = %self.config.docker.binary.display(), "provisioner initialised");

        let housekeeping = self.config.housekeeping.enabled.then(|| {
            let period = Duration::from_secs(self.config.housekeeping.interval_secs);
            info!(interval_secs = period.as_secs(), "housekeeping enabled");
            housekeeping::spawn(Arc::clone(&provisioner), period, self.cancel.child_token())
        });

        let app = api::router(AgentState { provisioner });

        let listener = tokio::net::TcpListener::bind(self.config.server.listen_addr)
            .await
            .map_err(|e| AgentError::Config(format!("failed to bind TCP: {e}")))?;

        info!(addr = %self.config.server.listen_addr, "agent listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.cancel.clone()))
            .await
            .map_err(|e| AgentError::Config(format!("server error: {e}")))?;

        self.cancel.cancel();
        if let Some(handle) = housekeeping {
            if let Err(e) = handle.await {
                warn!(error = %e, "housekeeping task ended abnormally");
            }
        }

        info!("agent shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
        () = terminate => info!("received SIGTERM, initiating shutdown"),
        () = cancel.cancelled() => info!("shutdown requested"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_shutdown() {
        let service = AgentService::new(AgentConfig::default());
        assert!(!service.cancel.is_cancelled());
        service.shutdown();
        assert!(service.cancel.is_cancelled());
    }
}
