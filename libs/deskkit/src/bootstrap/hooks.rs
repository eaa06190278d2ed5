use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use super::{BootstrapError, UiContext};
use crate::host::HostError;

/// Work done around the UI loop.
///
/// `before_run` hooks run in registration order; a failure aborts startup. `after_run` runs
/// in reverse order for every hook whose `before_run` succeeded, even if the UI loop failed.
#[async_trait]
pub trait RunHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn before_run(&self, _ctx: &UiContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_run(&self, _ctx: &UiContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Starts the embedded endpoint before the UI loop (if enabled) and stops it afterwards.
pub struct HostLifecycle {
    autostart: bool,
}

impl HostLifecycle {
    #[must_use]
    pub fn new(autostart: bool) -> Self {
        Self { autostart }
    }
}

#[async_trait]
impl RunHook for HostLifecycle {
    fn name(&self) -> &'static str {
        "host-lifecycle"
    }

    async fn before_run(&self, ctx: &UiContext) -> anyhow::Result<()> {
        if !self.autostart {
            return Ok(());
        }
        match ctx
            .host()
            .start(ctx.port_selection(), ctx.shutdown().child_token())
            .await
        {
            Ok(endpoint) => {
                tracing::info!(url = %endpoint.url(), "Embedded endpoint started");
                Ok(())
            }
            // The endpoint stays current and keeps starting; `after_run` stops it.
            Err(e @ (HostError::StartupTimeout { .. } | HostError::Cancelled { .. })) => {
                tracing::warn!(error = %e, "Embedded endpoint not confirmed ready; continuing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn after_run(&self, ctx: &UiContext) -> anyhow::Result<()> {
        ctx.host().stop().await;
        Ok(())
    }
}

/// Runs `after_run` of started hooks when finished or dropped.
pub(crate) struct PostRunGuard<'a> {
    runtime: &'a Runtime,
    ctx: &'a UiContext,
    hooks: &'a [Arc<dyn RunHook>],
    started: usize,
    done: bool,
}

impl<'a> PostRunGuard<'a> {
    pub(crate) fn new(
        runtime: &'a Runtime,
        ctx: &'a UiContext,
        hooks: &'a [Arc<dyn RunHook>],
    ) -> Self {
        Self {
            runtime,
            ctx,
            hooks,
            started: 0,
            done: false,
        }
    }

    /// Run every `before_run`, stopping at the first failure.
    pub(crate) fn run_before(&mut self) -> Result<(), BootstrapError> {
        for hook in self.hooks {
            tracing::debug!(hook = hook.name(), "Running pre-run hook");
            self.runtime
                .block_on(hook.before_run(self.ctx))
                .map_err(|source| BootstrapError::Hook {
                    hook: hook.name(),
                    source,
                })?;
            self.started += 1;
        }
        Ok(())
    }

    /// Run the post-run hooks and report the first failure.
    pub(crate) fn finish(mut self) -> Result<(), BootstrapError> {
        self.run_after()
    }

    fn run_after(&mut self) -> Result<(), BootstrapError> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        let mut first_error = None;
        for hook in self.hooks[..self.started].iter().rev() {
            tracing::debug!(hook = hook.name(), "Running post-run hook");
            if let Err(source) = self.runtime.block_on(hook.after_run(self.ctx)) {
                tracing::error!(
                    hook = hook.name(),
                    error = %format!("{source:#}"),
                    "Post-run hook failed"
                );
                if first_error.is_none() {
                    first_error = Some(BootstrapError::Hook {
                        hook: hook.name(),
                        source,
                    });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for PostRunGuard<'_> {
    fn drop(&mut self) {
        // Errors were logged in run_after.
        let _ = self.run_after();
    }
}

/// Cancels the shutdown token from OS signals for as long as it lives.
pub(crate) struct SignalWatch {
    stop: CancellationToken,
}

impl SignalWatch {
    pub(crate) fn spawn(runtime: &Runtime, shutdown: &CancellationToken) -> Self {
        let stop = CancellationToken::new();
        let watched = shutdown.clone();
        let own = stop.clone();
        runtime.spawn(async move {
            tokio::select! {
                () = own.cancelled() => {}
                () = super::signals::cancel_on_signal(watched) => {}
            }
        });
        Self { stop }
    }
}

impl Drop for SignalWatch {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
