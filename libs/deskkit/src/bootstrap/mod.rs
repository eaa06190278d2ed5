//! Application orchestration.
//!
//! Sequence: single-instance lock → discover modules → scan exports → build the container → resolve the main UI
//! entry → create the host → pre-run hooks → blocking UI loop on the calling thread →
//! post-run hooks → exit code.

mod hooks;
mod instance;
mod signals;
mod ui;

pub use hooks::{HostLifecycle, RunHook};
pub use instance::InstanceLock;
pub use ui::{UiContext, UiEntry};

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    process::ExitCode,
    sync::Arc,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{AppConfig, AppInfo},
    container::{ContainerBuilder, ContainerError},
    host::{EmbeddedServiceHost, HostOptions},
    lifecycle::panic_message,
    plugins::{DiscoveryError, ModuleSource, PluginDiscovery},
    registry::ExportRegistry,
};
use hooks::{PostRunGuard, SignalWatch};

#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    #[error("another instance of {app} is already running (lock {})", lock.display())]
    AlreadyRunning { app: String, lock: std::path::PathBuf },

    #[error("failed to take the instance lock {}", path.display())]
    InstanceLock {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build the async runtime")]
    Runtime(#[source] std::io::Error),

    #[error("failed to discover modules")]
    Discovery(#[from] DiscoveryError),

    #[error("failed to build the service container")]
    Container(#[from] ContainerError),

    #[error("main UI entry '{name}' is not registered")]
    MissingMainEntry { name: String },

    #[error("run hook '{hook}' failed")]
    Hook {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("UI loop failed")]
    Ui(#[source] anyhow::Error),

    #[error("UI loop panicked: {0}")]
    UiPanic(String),
}

pub struct OrchestratorBuilder {
    config: AppConfig,
    info: AppInfo,
    modules: Option<ModuleSource>,
    hooks: Vec<Arc<dyn RunHook>>,
    handle_signals: bool,
    worker_threads: Option<usize>,
}

impl OrchestratorBuilder {
    /// Module source; defaults to plugin discovery in `info.plugin_dir`.
    #[must_use]
    pub fn modules(mut self, modules: ModuleSource) -> Self {
        self.modules = Some(modules);
        self
    }

    /// Add a hook. Hooks run after the built-in [`HostLifecycle`] hook.
    #[must_use]
    pub fn hook(mut self, hook: Arc<dyn RunHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Whether Ctrl+C / SIGTERM cancel [`UiContext::shutdown`]. On by default.
    #[must_use]
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads.max(1));
        self
    }

    #[must_use]
    pub fn build(self) -> Orchestrator {
        let modules = self.modules.unwrap_or_else(|| {
            ModuleSource::Discovered(PluginDiscovery::from_config(&self.info, &self.config.plugins))
        });
        let mut hooks: Vec<Arc<dyn RunHook>> =
            vec![Arc::new(HostLifecycle::new(self.config.server.autostart))];
        hooks.extend(self.hooks);
        Orchestrator {
            config: Arc::new(self.config),
            info: Arc::new(self.info),
            modules,
            hooks,
            handle_signals: self.handle_signals,
            worker_threads: self.worker_threads,
        }
    }
}

/// Runs the application from module discovery to exit code.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    info: Arc<AppInfo>,
    modules: ModuleSource,
    hooks: Vec<Arc<dyn RunHook>>,
    handle_signals: bool,
    worker_threads: Option<usize>,
}

impl Orchestrator {
    #[must_use]
    pub fn builder(config: AppConfig, info: AppInfo) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            info,
            modules: None,
            hooks: Vec::new(),
            handle_signals: true,
            worker_threads: None,
        }
    }

    /// Run to completion: `0` after the UI loop returns, `1` on any failure.
    #[must_use]
    pub fn run(self) -> ExitCode {
        match self.try_run() {
            Ok(()) => {
                tracing::info!("Application exited normally");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", anyhow::Error::new(e)), "Application failed");
                ExitCode::FAILURE
            }
        }
    }

    /// Same as [`Orchestrator::run`] but returns the failure.
    ///
    /// # Errors
    /// Returns the first [`BootstrapError`] of the sequence. Post-run hooks still run when
    /// the UI loop fails; their own failure is reported only if the loop succeeded.
    pub fn try_run(self) -> Result<(), BootstrapError> {
        let _instance = self
            .config
            .app
            .single_instance
            .then(|| InstanceLock::acquire(&self.info.data_dir, &self.info.title_version()))
            .transpose()?;

        let mut runtime = tokio::runtime::Builder::new_multi_thread();
        runtime.enable_all().thread_name("deskhost-rt");
        if let Some(threads) = self.worker_threads {
            runtime.worker_threads(threads);
        }
        let runtime = runtime.build().map_err(BootstrapError::Runtime)?;
        let _entered = runtime.enter();

        tracing::info!(app = %self.info.title_version(), "Starting");

        let modules = self.modules.load()?;
        let catalog = ExportRegistry::scan(modules);

        let mut builder =
            ContainerBuilder::new().collision_policy(self.config.registry.on_collision);
        builder.add_instance(Arc::clone(&self.info))?;
        builder.add_instance(Arc::clone(&self.config))?;
        ExportRegistry::register(&mut builder, &catalog)?;
        let container = builder.build()?;

        let entry_name = &self.config.app.main_entry;
        let entry = catalog
            .entry(entry_name)
            .ok_or_else(|| BootstrapError::MissingMainEntry {
                name: entry_name.clone(),
            })?
            .resolve(&container)?;

        let host = Arc::new(EmbeddedServiceHost::new(
            Arc::clone(&container),
            self.modules.clone(),
            HostOptions::from_config(&self.config),
        ));
        let shutdown = CancellationToken::new();
        let _signals = self
            .handle_signals
            .then(|| SignalWatch::spawn(&runtime, &shutdown));

        let ctx = UiContext::new(
            runtime.handle().clone(),
            container,
            host,
            Arc::clone(&self.info),
            Arc::clone(&self.config),
            shutdown,
        );

        let mut guard = PostRunGuard::new(&runtime, &ctx, &self.hooks);
        guard.run_before()?;

        tracing::info!(entry = %entry_name, "Entering UI loop");
        let outcome = match catch_unwind(AssertUnwindSafe(|| entry.run(&ctx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BootstrapError::Ui(e)),
            Err(panic) => Err(BootstrapError::UiPanic(
                panic_message(panic.as_ref()).to_owned(),
            )),
        };
        tracing::info!("UI loop returned");

        let post = guard.finish();
        outcome.and(post)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("app", &self.info.title_version())
            .field("modules", &self.modules)
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
