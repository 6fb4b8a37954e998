//! Node agent
//!
//! Owns the lifetime of a node: starts discovery and gossip, serves the
//! HTTP API, and tears everything down when the lifetime token is
//! cancelled.

mod handlers;
mod metrics;
mod supervisor;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::discovery::Discovery;
use crate::error::{Error, Result};
use crate::gossip::Gossip;
use crate::wasm::{FunctionRegistry, RunnerConfig, WasmRunner};

pub use handlers::{router, AppState, DeployRequest};
pub use metrics::ExecMetrics;
pub use supervisor::{Supervisor, TaskExit};

/// How long shutdown waits for background tasks to report
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Agent {
    config: NodeConfig,
    registry: Arc<FunctionRegistry>,
    metrics: Arc<ExecMetrics>,
    token: CancellationToken,
}

impl Agent {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let runner = WasmRunner::new(RunnerConfig {
            timeout: config.execution.timeout(),
        })?;

        Ok(Self {
            config,
            registry: Arc::new(FunctionRegistry::new(runner)),
            metrics: Arc::new(ExecMetrics::new()),
            token: CancellationToken::new(),
        })
    }

    /// Cancelling this token shuts the node down
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start every component, then serve until the token is cancelled.
    ///
    /// Any startup failure cancels what already started and is returned.
    pub async fn run(self) -> Result<()> {
        let mut supervisor = Supervisor::new();

        let result = self.serve(&mut supervisor).await;
        self.token.cancel();

        let pending = drain(&mut supervisor, SHUTDOWN_GRACE).await;
        if pending > 0 {
            warn!(pending, "Background tasks did not stop in time");
        }

        info!("Node stopped");
        result
    }

    async fn serve(&self, supervisor: &mut Supervisor) -> Result<()> {
        let node = &self.config.node;
        let instance = self.config.instance_name();

        let discovery = Discovery::advertise(&self.config.discovery, &instance, node.port)?;
        debug!(service = %discovery.fullname(), "Discovery started");
        supervisor.spawn("discovery", discovery.serve(self.token.clone()));

        let gossip = Gossip::join(&self.config.gossip)?;
        let gossip_handle = gossip.handle();
        supervisor.spawn("gossip", gossip.run(self.token.clone()));

        let addr = format!("{}:{}", node.bind_address, node.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::ListenerStartup {
                addr: addr.clone(),
                source: e,
            })?;

        info!(
            instance = %instance,
            addr = %addr,
            peer_id = %gossip_handle.peer_id(),
            "Node listening"
        );

        let app = router(AppState {
            registry: self.registry.clone(),
            gossip: gossip_handle,
            metrics: self.metrics.clone(),
        });

        let shutdown = self.token.clone();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .into_future();
        tokio::pin!(server);

        loop {
            tokio::select! {
                result = &mut server => {
                    debug!("HTTP server stopped");
                    return result.map_err(|e| Error::Internal(format!("HTTP server failed: {}", e)));
                }
                Some(exit) = supervisor.next_exit() => {
                    log_exit(&exit, self.token.is_cancelled());
                }
            }
        }
    }
}

/// Wait up to `grace` for the tasks that have not reported yet; returns
/// how many are still running.
async fn drain(supervisor: &mut Supervisor, grace: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        match tokio::time::timeout_at(deadline, supervisor.next_exit()).await {
            Ok(Some(exit)) => log_exit(&exit, true),
            Ok(None) => return 0,
            Err(_) => return supervisor.pending(),
        }
    }
}

fn log_exit(exit: &TaskExit, shutting_down: bool) {
    match (&exit.outcome, shutting_down) {
        (Ok(()), true) => debug!(task = exit.name, "Background task stopped"),
        (Ok(()), false) => warn!(task = exit.name, "Background task stopped before shutdown"),
        (Err(e), _) => error!(task = exit.name, error = %e.format_for_log(), "Background task failed"),
    }
}

/// Cancel `token` on Ctrl-C
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });
}
