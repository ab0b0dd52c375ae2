//! Server lifecycle: Starting -> Listening -> Draining -> Stopped.
//!
//! Startup failures (initial policy, bind) are fatal and returned from
//! [`SentryServer::start`]. Everything after that is contained per session.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use sentry_core::error::{Result, SentryError};
use sentry_core::report::SharedReporter;

use crate::app_state::AppState;
use crate::config::SentryConfig;
use crate::policy::PolicyStore;
use crate::{ops, transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServerState {
    Starting,
    Listening,
    Draining,
    Stopped,
}

impl ServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerState::Starting => "starting",
            ServerState::Listening => "listening",
            ServerState::Draining => "draining",
            ServerState::Stopped => "stopped",
        }
    }
}

/// Resolves once the lifecycle reaches Draining (or later).
pub(crate) async fn wait_draining(rx: &mut watch::Receiver<ServerState>) {
    let _ = rx.wait_for(|s| *s >= ServerState::Draining).await;
}

pub(crate) async fn wait_stopped(rx: &mut watch::Receiver<ServerState>) {
    let _ = rx.wait_for(|s| *s == ServerState::Stopped).await;
}

pub struct SentryServer;

impl SentryServer {
    /// Load the configured policy source, then start serving.
    pub async fn start(cfg: SentryConfig, reporter: SharedReporter) -> Result<ServerHandle> {
        let store = PolicyStore::from_file(&cfg.policy.source)?;
        Self::start_with_store(cfg, Arc::new(store), reporter).await
    }

    /// Start serving an already loaded store.
    pub async fn start_with_store(
        cfg: SentryConfig,
        store: Arc<PolicyStore>,
        reporter: SharedReporter,
    ) -> Result<ServerHandle> {
        let app = AppState::new(cfg, store, reporter);

        let listener = bind(&app.cfg().server.listen).await?;
        let local_addr = listener.local_addr()?;

        let admin = match app.cfg().server.admin_listen.as_deref() {
            Some(addr) => {
                let admin_listener = bind(addr).await?;
                let admin_addr = admin_listener.local_addr()?;
                let task = tokio::spawn(ops::serve_admin(admin_listener, app.clone()));
                Some((admin_addr, task))
            }
            None => None,
        };

        let snapshot = app.store().current();
        tracing::info!(
            %local_addr,
            generation = snapshot.generation(),
            entries = snapshot.len(),
            rules = snapshot.rule_count(),
            cache_capacity = app.cfg().cache.capacity,
            "sentry listening"
        );
        if snapshot.is_empty() && snapshot.rule_count() == 0 {
            tracing::warn!(
                default = %snapshot.default_decision(),
                "policy has no entries or rules; every lookup gets the default"
            );
        }
        app.advance(ServerState::Listening);

        let accept_app = app.clone();
        let task = tokio::spawn(async move {
            transport::serve(listener, accept_app.clone()).await;
            accept_app.advance(ServerState::Stopped);
            tracing::info!("sentry stopped");
        });

        let (admin_addr, admin_task) = match admin {
            Some((addr, task)) => (Some(addr), Some(task)),
            None => (None, None),
        };

        Ok(ServerHandle {
            app,
            local_addr,
            admin_addr,
            task,
            admin_task,
        })
    }
}

async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| SentryError::Io(std::io::Error::new(e.kind(), format!("bind {addr}: {e}"))))
}

/// Handle on a running server.
pub struct ServerHandle {
    app: AppState,
    local_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    task: JoinHandle<()>,
    admin_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn app(&self) -> &AppState {
        &self.app
    }

    pub fn state(&self) -> ServerState {
        self.app.state()
    }

    /// Re-read the policy source; returns the new snapshot generation.
    pub fn reload(&self) -> Result<u64> {
        self.app.reload_policy()
    }

    pub fn reload_from_str(&self, source_text: &str) -> Result<u64> {
        self.app.reload_policy_from_str(source_text)
    }

    /// Stop accepting and let sessions finish. Returns immediately.
    pub fn shutdown(&self) {
        tracing::info!("sentry draining");
        self.app.advance(ServerState::Draining);
    }

    /// Wait until the server reaches Stopped (after [`ServerHandle::shutdown`]).
    pub async fn stopped(self) -> Result<()> {
        let res = self
            .task
            .await
            .map_err(|e| SentryError::Internal(format!("accept task failed: {e}")));
        // the accept task normally marks Stopped itself; cover the failure path too
        self.app.advance(ServerState::Stopped);
        if let Some(admin) = self.admin_task {
            let _ = admin.await;
        }
        res
    }

    pub async fn shutdown_and_wait(self) -> Result<()> {
        self.shutdown();
        self.stopped().await
    }
}
