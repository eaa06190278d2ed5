//! Lifecycle primitives shared by the host and its workers.

use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::oneshot;

/// One-shot "I'm ready" signal, raised by a worker once its listener is bound.
#[derive(Debug)]
pub struct ReadySignal(oneshot::Sender<()>);

impl ReadySignal {
    #[must_use]
    pub fn from_sender(sender: oneshot::Sender<()>) -> Self {
        Self(sender)
    }

    /// Create a signal and the receiver that observes it.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    #[inline]
    pub fn notify(self) {
        // The waiter may have given up already.
        let _ = self.0.send(());
    }
}

/// Observable state of a hosted endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Stopping => "stopping",
            Status::Stopped => "stopped",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Status::Starting,
            1 => Status::Running,
            2 => Status::Stopping,
            _ => Status::Stopped,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free status cell. Transitions only move forward.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    #[must_use]
    pub fn new(status: Status) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    #[must_use]
    pub fn get(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Advance to `next`. Returns false if the cell is already at or past `next`.
    pub fn advance(&self, next: Status) -> bool {
        self.0.fetch_max(next as u8, Ordering::AcqRel) < next as u8
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
