//! Embedded service host.
//!
//! Runs a network endpoint inside a process whose main thread belongs to a blocking UI loop.
//! The host owns one atomically swappable "current endpoint":
//! - [`EmbeddedServiceHost::start`] builds a new endpoint, swaps it in, tears the displaced
//!   one down in the background, then waits a bounded time for readiness;
//! - [`EmbeddedServiceHost::stop`] swaps in nothing and awaits the teardown.
//!
//! The swap is the only synchronization point between concurrent callers. The swapped slot
//! also carries the hand-over token of the most recently displaced endpoint, so a new endpoint
//! binds only after that one closed its acceptor, whether `start` or `stop` displaced it.

mod endpoint;
mod port;
mod readiness;
mod routes;

pub use endpoint::HostedEndpoint;
pub use port::{DEV_PORT, PortSelection};
pub use routes::{Controller, RequestScope};

use arc_swap::ArcSwap;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    container::{CollisionPolicy, ContainerBuilder, ContainerError, ServiceContainer},
    plugins::{DiscoveryError, ModuleSource},
    registry::ExportRegistry,
};
use endpoint::WorkerExit;
use readiness::Readiness;

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("failed to select a port")]
    Port(#[source] std::io::Error),

    #[error("failed to discover endpoint modules")]
    Discovery(#[from] DiscoveryError),

    #[error("failed to compose endpoint services")]
    Container(#[from] ContainerError),

    #[error("failed to launch endpoint worker")]
    Launch(#[source] std::io::Error),

    #[error("endpoint on port {port} faulted during startup")]
    StartupFault {
        port: u16,
        #[source]
        source: anyhow::Error,
    },

    #[error("endpoint on port {port} exited before signalling readiness")]
    EarlyExit { port: u16 },

    #[error("endpoint on port {port} did not confirm readiness within {timeout:?}")]
    StartupTimeout { port: u16, timeout: Duration },

    #[error("start cancelled while waiting for endpoint on port {port}")]
    Cancelled { port: u16 },

    #[error("endpoint on port {port} did not stop within {timeout:?}")]
    StopTimeout { port: u16, timeout: Duration },

    #[error("endpoint worker on port {port} failed")]
    Worker {
        port: u16,
        #[source]
        source: anyhow::Error,
    },
}

/// Timing and registration knobs of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostOptions {
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
    pub on_collision: CollisionPolicy,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(30),
            on_collision: CollisionPolicy::Replace,
        }
    }
}

impl HostOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ready_timeout: Duration::from_millis(config.server.ready_timeout_ms),
            poll_interval: Duration::from_millis(config.server.poll_interval_ms),
            stop_timeout: Duration::from_millis(config.server.stop_timeout_ms),
            on_collision: config.registry.on_collision,
        }
    }
}

/// Current endpoint plus the token the next endpoint must wait on before binding.
#[derive(Default)]
struct Slot {
    endpoint: Option<Arc<HostedEndpoint>>,
    handover: Option<CancellationToken>,
}

impl Slot {
    fn holding(endpoint: &Arc<HostedEndpoint>) -> Self {
        Self {
            endpoint: Some(Arc::clone(endpoint)),
            handover: Some(endpoint.handover_token()),
        }
    }

    fn vacated(&self) -> Self {
        Self {
            endpoint: None,
            handover: self.handover.clone(),
        }
    }

    fn holds(&self, endpoint: &Arc<HostedEndpoint>) -> bool {
        self.endpoint.as_ref().is_some_and(|e| Arc::ptr_eq(e, endpoint))
    }
}

/// Owner of the current endpoint.
pub struct EmbeddedServiceHost {
    parent: Arc<ServiceContainer>,
    modules: ModuleSource,
    options: HostOptions,
    slot: ArcSwap<Slot>,
}

impl EmbeddedServiceHost {
    /// `parent` supplies the singletons every endpoint shares; `modules` is rediscovered for
    /// each endpoint.
    #[must_use]
    pub fn new(parent: Arc<ServiceContainer>, modules: ModuleSource, options: HostOptions) -> Self {
        Self {
            parent,
            modules,
            options,
            slot: ArcSwap::from_pointee(Slot::default()),
        }
    }

    #[must_use]
    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// The endpoint currently reachable, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<HostedEndpoint>> {
        self.slot.load().endpoint.clone()
    }

    /// Start a new endpoint and make it current.
    ///
    /// Returns once the endpoint signalled readiness. An endpoint that was superseded or
    /// stopped before it could bind is returned as well; it is then no longer running.
    ///
    /// # Errors
    /// - [`HostError::Port`], [`HostError::Discovery`], [`HostError::Container`],
    ///   [`HostError::Launch`]: the endpoint could not be built; nothing changed.
    /// - [`HostError::StartupFault`] / [`HostError::EarlyExit`]: the worker died before it
    ///   became ready; it is removed again if still current.
    /// - [`HostError::StartupTimeout`] / [`HostError::Cancelled`]: readiness was not confirmed;
    ///   the endpoint stays current.
    pub async fn start(
        &self,
        selection: PortSelection,
        cancel: CancellationToken,
    ) -> Result<Arc<HostedEndpoint>, HostError> {
        let port = selection.resolve().map_err(HostError::Port)?;

        let modules = self.modules.load()?;
        let catalog = ExportRegistry::scan(modules);
        let mut builder = ContainerBuilder::with_parent(Arc::clone(&self.parent))
            .collision_policy(self.options.on_collision);
        ExportRegistry::register(&mut builder, &catalog)?;
        let container = builder.build()?;
        let router = routes::build_router(&container, &catalog.controllers)?;

        let (endpoint, launch) = HostedEndpoint::launch(port, router)?;

        // Linearization point: exactly one caller observes each displaced slot.
        let previous = self.slot.swap(Arc::new(Slot::holding(&endpoint)));
        // The worker only drops out if it already died; readiness reports that.
        let _ = launch.gate.send(previous.handover.clone());
        if let Some(displaced) = previous.endpoint.clone() {
            self.retire(displaced);
        }

        tracing::info!(
            endpoint = %endpoint.id(),
            url = %endpoint.url(),
            "Endpoint starting"
        );

        let outcome = readiness::wait_ready(
            launch.ready,
            &endpoint.worker,
            self.options.ready_timeout,
            self.options.poll_interval,
            &cancel,
        )
        .await;

        match outcome {
            Readiness::Ready => {
                endpoint.mark_running();
                tracing::info!(endpoint = %endpoint.id(), url = %endpoint.url(), "Endpoint ready");
                Ok(endpoint)
            }
            Readiness::Exited(WorkerExit::Superseded) => {
                tracing::debug!(
                    endpoint = %endpoint.id(),
                    "Endpoint was superseded before it became ready"
                );
                Ok(endpoint)
            }
            Readiness::Exited(WorkerExit::Served) => {
                self.discard(&endpoint).await;
                Err(HostError::EarlyExit { port })
            }
            Readiness::Faulted(source) => {
                tracing::error!(
                    endpoint = %endpoint.id(),
                    error = %format!("{source:#}"),
                    "Endpoint faulted during startup"
                );
                self.discard(&endpoint).await;
                Err(HostError::StartupFault { port, source })
            }
            Readiness::TimedOut => {
                tracing::warn!(
                    endpoint = %endpoint.id(),
                    timeout = ?self.options.ready_timeout,
                    "Endpoint readiness not confirmed; it stays current"
                );
                Err(HostError::StartupTimeout {
                    port,
                    timeout: self.options.ready_timeout,
                })
            }
            Readiness::Cancelled => Err(HostError::Cancelled { port }),
        }
    }

    /// Make no endpoint current and wait for the previous one to go away.
    ///
    /// Never fails; teardown errors are logged.
    pub async fn stop(&self) {
        let displaced = self.slot.rcu(|slot| slot.vacated());
        let Some(previous) = displaced.endpoint.clone() else {
            tracing::debug!("Stop requested with no current endpoint");
            return;
        };
        if let Err(e) = previous.dispose(self.options.stop_timeout).await {
            tracing::error!(endpoint = %previous.id(), error = %e, "Endpoint teardown failed");
        }
    }

    /// Tear down a displaced endpoint without blocking the caller.
    fn retire(&self, previous: Arc<HostedEndpoint>) {
        let timeout = self.options.stop_timeout;
        tokio::spawn(async move {
            tracing::debug!(endpoint = %previous.id(), "Retiring displaced endpoint");
            if let Err(e) = previous.dispose(timeout).await {
                tracing::error!(endpoint = %previous.id(), error = %e, "Endpoint teardown failed");
            }
        });
    }

    /// Remove a dead endpoint if nobody displaced it yet, then reap it.
    async fn discard(&self, endpoint: &Arc<HostedEndpoint>) {
        self.slot.rcu(|slot| {
            if slot.holds(endpoint) {
                Arc::new(slot.vacated())
            } else {
                Arc::clone(slot)
            }
        });
        if let Err(e) = endpoint.dispose(self.options.stop_timeout).await {
            tracing::debug!(endpoint = %endpoint.id(), error = %e, "Faulted endpoint reaped");
        }
    }
}

impl std::fmt::Debug for EmbeddedServiceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedServiceHost")
            .field("options", &self.options)
            .field("current", &self.current().map(|e| e.url().to_owned()))
            .finish_non_exhaustive()
    }
}
