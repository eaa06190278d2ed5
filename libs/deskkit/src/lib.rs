//! Desktop application kit: a type-keyed service container fed by link-time module exports,
//! an embedded network endpoint that can be hot-swapped at runtime, and an orchestrator that
//! runs a blocking UI loop around both.

pub mod bootstrap;
pub mod config;
pub mod container;
pub mod host;
pub mod lifecycle;
pub mod lifetime;
pub mod logging;
pub mod plugins;
pub mod registry;

pub use bootstrap::{
    BootstrapError, HostLifecycle, InstanceLock, Orchestrator, OrchestratorBuilder, RunHook,
    UiContext, UiEntry,
};
pub use config::{AppConfig, AppInfo, CliOverrides, ConfigError};
pub use container::{
    CollisionPolicy, ContainerBuilder, ContainerError, ServiceContainer, ServiceRegistration,
    ServiceScope, TypeKey,
};
pub use host::{
    Controller, EmbeddedServiceHost, HostError, HostOptions, HostedEndpoint, PortSelection,
    RequestScope,
};
pub use lifecycle::Status;
pub use lifetime::Lifetime;
pub use logging::{LoggingGuard, init_logging};
pub use plugins::{ModuleSource, PluginDiscovery};
pub use registry::{ExportCatalog, ExportModule, ExportRegistry, ExportSet, Injectable};
