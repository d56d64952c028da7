//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the request pipeline around the upstream router
//! - Wire up middleware (request ID, tracing, timeout, gate)
//! - Accept connections and serve each on its own task
//! - Apply reloaded gate policies
//! - Drain connections on shutdown

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, mpsc};
use tower::util::BoxCloneSyncService;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{validate_config, ConfigError, GateConfig, ValidationError};
use crate::gate::{DropConnectionLayer, StatusPolicy};
use crate::http::upstream::{self, UpstreamState};
use crate::net::connection::{self, ConnectionService, ConnectionTracker};
use crate::net::{Listener, ListenerError};

/// HTTP server running the gate in front of the upstream.
pub struct GateServer {
    app: ConnectionService,
    policy: Arc<ArcSwap<StatusPolicy>>,
    config: GateConfig,
    tracker: ConnectionTracker,
}

impl GateServer {
    /// Create a server from a configuration.
    ///
    /// Fails on any invalid setting; a malformed status range never makes it
    /// past this point.
    pub fn new(config: GateConfig) -> Result<Self, ConfigError> {
        validate_config(&config)?;

        let policy = StatusPolicy::parse(&config.gate.status_code)
            .map_err(|e| ConfigError::Validation(vec![ValidationError::StatusCode(e)]))?;
        let upstream = UpstreamState::new(&config.upstream).map_err(|_| {
            ConfigError::Validation(vec![ValidationError::InvalidUpstream(
                config.upstream.address.clone(),
            )])
        })?;

        tracing::info!(
            policy = %policy,
            upstream = %config.upstream.address,
            "Gate configured"
        );

        let policy = Arc::new(ArcSwap::from_pointee(policy));
        let app = Self::build_service(&config, Arc::clone(&policy), upstream);

        Ok(Self {
            app,
            policy,
            config,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Build the per-connection pipeline. Layers listed last run first.
    #[allow(deprecated)]
    fn build_service(
        config: &GateConfig,
        policy: Arc<ArcSwap<StatusPolicy>>,
        upstream: UpstreamState,
    ) -> ConnectionService {
        let gate = DropConnectionLayer::shared(policy)
            .max_buffered_bytes(config.gate.max_buffered_bytes);

        let router = upstream::router(upstream)
            .layer(gate)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        BoxCloneSyncService::new(router)
    }

    /// Run the server until `shutdown` fires, then drain connections.
    pub async fn run(
        self,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %addr, "Gate server starting");

        // Connections subscribe through this copy; `shutdown` itself is polled below.
        let connection_shutdown = shutdown.resubscribe();
        let mut updates_open = true;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                update = config_updates.recv(), if updates_open => match update {
                    Some(config) => self.apply_update(config),
                    None => updates_open = false,
                },
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track();
                        let app = self.app.clone();
                        let shutdown = connection_shutdown.resubscribe();
                        tokio::spawn(async move {
                            let _permit = permit;
                            connection::serve(stream, peer, app, guard, shutdown).await;
                        });
                    }
                    Err(ListenerError::Closed) => return Err(ListenerError::Closed),
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
            }
        }

        let deadline = Duration::from_secs(self.config.timeouts.shutdown_secs);
        if tokio::time::timeout(deadline, self.tracker.wait_for_shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Shutdown deadline reached with connections still open"
            );
        }

        tracing::info!("Gate server stopped");
        Ok(())
    }

    /// Swap in the gate policy from a reloaded configuration.
    fn apply_update(&self, update: GateConfig) {
        match StatusPolicy::parse(&update.gate.status_code) {
            Ok(policy) => {
                tracing::info!(policy = %policy, "Gate policy reloaded");
                self.policy.store(Arc::new(policy));
            }
            Err(e) => {
                tracing::error!(error = %e, "Reloaded status range rejected, keeping current policy");
            }
        }

        if update.listener.bind_address != self.config.listener.bind_address
            || update.upstream.address != self.config.upstream.address
            || update.gate.max_buffered_bytes != self.config.gate.max_buffered_bytes
        {
            tracing::warn!("Only gate.status_code is reloaded; other changes need a restart");
        }
    }

    /// The policy currently applied to new requests.
    pub fn policy(&self) -> Arc<StatusPolicy> {
        self.policy.load_full()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}
