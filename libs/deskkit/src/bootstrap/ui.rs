use std::{future::Future, sync::Arc};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{AppConfig, AppInfo},
    container::ServiceContainer,
    host::{EmbeddedServiceHost, PortSelection},
};

/// A blocking UI loop that owns the calling thread until the UI closes.
///
/// Registered with [`ExportSet::entry`](crate::registry::ExportSet::entry) and selected by
/// the `app.main_entry` setting.
pub trait UiEntry: Send + Sync + 'static {
    /// # Errors
    /// An error ends the application with a failure exit code.
    fn run(&self, ctx: &UiContext) -> anyhow::Result<()>;
}

/// Everything a UI loop may use.
pub struct UiContext {
    runtime: Handle,
    container: Arc<ServiceContainer>,
    host: Arc<EmbeddedServiceHost>,
    info: Arc<AppInfo>,
    config: Arc<AppConfig>,
    shutdown: CancellationToken,
}

impl UiContext {
    pub(crate) fn new(
        runtime: Handle,
        container: Arc<ServiceContainer>,
        host: Arc<EmbeddedServiceHost>,
        info: Arc<AppInfo>,
        config: Arc<AppConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            container,
            host,
            info,
            config,
            shutdown,
        }
    }

    /// Drive `future` to completion from the UI thread.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    #[must_use]
    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    #[must_use]
    pub fn host(&self) -> &Arc<EmbeddedServiceHost> {
        &self.host
    }

    #[must_use]
    pub fn info(&self) -> &AppInfo {
        &self.info
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Port selection derived from the `server` settings.
    #[must_use]
    pub fn port_selection(&self) -> PortSelection {
        PortSelection::from_config(&self.config.server)
    }

    /// Cancelled when a termination signal arrives; UI loops should return promptly.
    #[must_use]
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

impl std::fmt::Debug for UiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiContext")
            .field("app", &self.info.title_version())
            .field("host", &self.host)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
