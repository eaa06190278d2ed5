//! One running network endpoint and its dedicated worker thread.
//!
//! Worker sequence:
//! 1. wait for the gate, which carries the hand-over token of the endpoint this one displaced;
//! 2. wait until that predecessor has closed its acceptor;
//! 3. bind, raise the [`ReadySignal`], serve until cancelled.
//!
//! Every endpoint owns two tokens:
//! - `closed` fires once its listening socket is gone (or it never got one). Successors gate
//!   on it, so at most one endpoint of a host accepts connections at any instant while the
//!   predecessor may still be draining in-flight requests.
//! - `released` fires once its worker thread is gone.
//!
//! An endpoint waits for its predecessor even when cancelled, so `closed` is transitive down
//! a chain of displaced endpoints.

use anyhow::Context;
use axum::{Router, serve::Listener};
use parking_lot::Mutex;
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use super::HostError;
use crate::lifecycle::{ReadySignal, Status, StatusCell, panic_message};

/// How a worker ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// Bound, served, and shut down gracefully.
    Served,
    /// Cancelled before it ever bound.
    Superseded,
}

type WorkerResult = anyhow::Result<WorkerExit>;

/// Join handle of a worker thread, taken by whoever joins first.
pub(crate) struct Worker {
    handle: Mutex<Option<JoinHandle<WorkerResult>>>,
}

impl Worker {
    pub(crate) fn new(handle: JoinHandle<WorkerResult>) -> Self {
        Self {
            handle: Mutex::new(Some(handle)),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Join the thread off the async executor. `None` if it was already joined.
    pub(crate) async fn join(&self) -> Option<WorkerResult> {
        let handle = self.handle.lock().take()?;
        let joined = tokio::task::spawn_blocking(move || handle.join()).await;
        Some(match joined {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(anyhow::anyhow!(
                "endpoint worker panicked: {}",
                panic_message(panic.as_ref())
            )),
            Err(e) => Err(anyhow::Error::new(e).context("failed to join endpoint worker")),
        })
    }
}

/// TCP acceptor that fires the endpoint's `closed` token when axum drops it.
///
/// Graceful shutdown drops the listener before draining open connections, so the token fires
/// as soon as no new connection can be accepted.
struct ClosingListener {
    inner: TcpListener,
    _closed: DropGuard,
}

impl Listener for ClosingListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        Listener::accept(&mut self.inner).await
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        Listener::local_addr(&self.inner)
    }
}

/// Handles the starting side keeps after launching a worker.
pub(crate) struct Launch {
    pub(crate) gate: oneshot::Sender<Option<CancellationToken>>,
    pub(crate) ready: oneshot::Receiver<()>,
}

/// Handle to one running network endpoint.
pub struct HostedEndpoint {
    id: Uuid,
    addr: SocketAddr,
    url: String,
    status: StatusCell,
    cancel: CancellationToken,
    closed: CancellationToken,
    released: CancellationToken,
    pub(crate) worker: Worker,
}

impl HostedEndpoint {
    /// Spawn the worker thread. The worker does nothing until the gate is opened.
    pub(crate) fn launch(port: u16, router: Router) -> Result<(Arc<Self>, Launch), HostError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
        let cancel = CancellationToken::new();
        let closed = CancellationToken::new();
        let released = CancellationToken::new();
        let (gate_tx, gate_rx) = oneshot::channel();
        let (ready, ready_rx) = ReadySignal::channel();

        let handle = {
            let cancel = cancel.clone();
            let closed = closed.clone();
            let released = released.clone();
            std::thread::Builder::new()
                .name(format!("endpoint-{port}"))
                .spawn(move || {
                    // Declared first so it fires last, after the runtime and socket are gone.
                    let _released = released.drop_guard();
                    let closed = closed.drop_guard();
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .context("failed to build endpoint runtime")?;
                    runtime.block_on(serve(addr, router, cancel, gate_rx, ready, closed))
                })
                .map_err(HostError::Launch)?
        };

        let endpoint = Arc::new(Self {
            id: Uuid::new_v4(),
            addr,
            url: format!("http://{addr}"),
            status: StatusCell::new(Status::Starting),
            cancel,
            closed,
            released,
            worker: Worker::new(handle),
        });
        tracing::debug!(endpoint = %endpoint.id, %addr, "Endpoint worker launched");
        Ok((
            endpoint,
            Launch {
                gate: gate_tx,
                ready: ready_rx,
            },
        ))
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base address, e.g. `http://127.0.0.1:9000`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Whether the endpoint no longer accepts new connections. In-flight requests may still
    /// be draining.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Whether the worker thread has exited and every connection is gone.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.is_cancelled()
    }

    /// Resolves once the worker thread has exited.
    pub async fn released(&self) {
        self.released.cancelled().await;
    }

    /// Token a successor waits on before it binds.
    pub(crate) fn handover_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub(crate) fn mark_running(&self) -> bool {
        self.status.advance(Status::Running)
    }

    /// Cancel the worker and wait for it to exit, at most `timeout`.
    ///
    /// # Errors
    /// Returns [`HostError::StopTimeout`] if the worker did not exit in time, or
    /// [`HostError::Worker`] if it ended with an error.
    pub async fn dispose(&self, timeout: Duration) -> Result<(), HostError> {
        self.status.advance(Status::Stopping);
        self.cancel.cancel();

        if tokio::time::timeout(timeout, self.released.cancelled())
            .await
            .is_err()
        {
            // Let successors proceed; the stuck thread is abandoned.
            self.closed.cancel();
            self.released.cancel();
            self.status.advance(Status::Stopped);
            return Err(HostError::StopTimeout {
                port: self.port(),
                timeout,
            });
        }

        let result = self.worker.join().await;
        self.status.advance(Status::Stopped);
        tracing::info!(endpoint = %self.id, url = %self.url, "Endpoint stopped");
        match result {
            Some(Err(source)) => Err(HostError::Worker {
                port: self.port(),
                source,
            }),
            Some(Ok(_)) | None => Ok(()),
        }
    }
}

impl Drop for HostedEndpoint {
    fn drop(&mut self) {
        // An endpoint nobody refers to any more must not keep serving.
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for HostedEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedEndpoint")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("status", &self.status.get())
            .field("closed", &self.closed.is_cancelled())
            .field("released", &self.released.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn serve(
    addr: SocketAddr,
    router: Router,
    cancel: CancellationToken,
    gate: oneshot::Receiver<Option<CancellationToken>>,
    ready: ReadySignal,
    closed: DropGuard,
) -> WorkerResult {
    // A dropped gate means the start was abandoned before the swap; nobody precedes us.
    if let Ok(Some(predecessor)) = gate.await {
        predecessor.cancelled().await;
    }
    if cancel.is_cancelled() {
        tracing::debug!(%addr, "Endpoint superseded before binding");
        return Ok(WorkerExit::Superseded);
    }

    let inner = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let listener = ClosingListener {
        inner,
        _closed: closed,
    };
    tracing::info!(%addr, "Endpoint listening");
    ready.notify();

    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .with_context(|| format!("endpoint {addr} failed while serving"))?;
    Ok(WorkerExit::Served)
}
