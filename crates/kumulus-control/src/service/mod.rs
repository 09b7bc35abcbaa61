//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::agent::HttpAgentClient;
use crate::api::{self, AppState};
use crate::config::{ControlConfig, DatabaseBackend};
use crate::error::{ControlError, ControlResult};
use crate::orchestrator::Orchestrator;
use crate::scheduler::{Scheduler, ScoreFirst};
use crate::store::{MemoryRegistry, PostgresRegistry, Registry};

/// The control service.
///
/// Manages the lifecycle of the control plane, including:
/// - The database pool, opened at start and closed on shutdown
/// - The agent client
/// - HTTP API server
/// - Signal handling and graceful shutdown
pub struct ControlService {
    config: ControlConfig,
    cancel: CancellationToken,
}

impl ControlService {
    /// Create a new control service with the given configuration.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the control service.
    ///
    /// This will:
    /// 1. Open the registry (PostgreSQL pool or in-memory)
    /// 2. Build the agent client, scheduler and orchestrator
    /// 3. Serve the HTTP API until a shutdown signal arrives
    /// 4. Close the database pool
    pub async fn run(&self) -> ControlResult<()> {
        let (registry, pool) = self.open_registry().await?;

        let agent = Arc::new(HttpAgentClient::new(&self.config.agent)?);
        info!(
            port = self.config.agent.port,
            timeout_secs = self.config.agent.request_timeout_secs,
            "agent client configured"
        );

        let policy = Arc::new(ScoreFirst::new(self.config.scheduling.max_load));
        let scheduler = Scheduler::new(Arc::clone(&registry), policy);
        let orchestrator = Arc::new(Orchestrator::new(registry, scheduler, agent));
        info!(
            max_load = self.config.scheduling.max_load,
            "orchestrator initialised"
        );

        let app = api::router(AppState::new(orchestrator));

        let served = self.serve(app).await;

        if let Some(pool) = pool {
            pool.close().await;
            info!("database pool closed");
        }
        served?;

        info!("control service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn open_registry(&self) -> ControlResult<(Arc<dyn Registry>, Option<PgPool>)> {
        let database = &self.config.database;
        match database.backend {
            DatabaseBackend::Memory => {
                info!("using in-memory registry");
                Ok((Arc::new(MemoryRegistry::new()), None))
            }
            DatabaseBackend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(database.max_connections)
                    .min_connections(database.min_connections)
                    .acquire_timeout(Duration::from_secs(database.connect_timeout_secs))
                    .connect(&database.url)
                    .await?;
                let registry = PostgresRegistry::from_pool(pool.clone()).await?;
                info!(
                    max_connections = database.max_connections,
                    "connected to PostgreSQL"
                );
                Ok((Arc::new(registry), Some(pool)))
            }
        }
    }

    async fn serve(&self, app: axum::Router) -> ControlResult<()> {
        let addr = self.config.server.listen_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ControlError::Config(format!("failed to bind TCP: {e}")))?;

        info!(addr = %addr, "control service listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.cancel.clone()))
            .await
            .map_err(|e| ControlError::Config(format!("server error: {e}")))
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
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}
