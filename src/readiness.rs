//! Store readiness gate.
//!
//! The startup sequence owns the only [`ReadinessHandle`]; request handlers
//! hold a [`ReadinessGate`] and read a single snapshot at the start of each
//! request.

use serde::Serialize;
use tokio::sync::watch;

/// State of the backing data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StoreStatus {
    /// Schema applied and connection established.
    Ready,
    /// Startup has not finished connecting or migrating.
    Initializing,
    /// Startup gave up. The reason is for logs and operators only.
    Failed(String),
}

impl StoreStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => "ready",
            Self::Initializing => "initializing",
            Self::Failed(_) => "failed",
        }
    }
}

/// Read side of the readiness flag, cloned into every request's state.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    rx: watch::Receiver<StoreStatus>,
}

/// Write side of the readiness flag, held by the startup sequence.
#[derive(Debug)]
pub struct ReadinessHandle {
    tx: watch::Sender<StoreStatus>,
}

impl ReadinessGate {
    /// Create a gate in the `Initializing` state plus its single writer.
    pub fn new() -> (ReadinessHandle, ReadinessGate) {
        let (tx, rx) = watch::channel(StoreStatus::Initializing);
        (ReadinessHandle { tx }, ReadinessGate { rx })
    }

    /// A gate that is open from the start and can never change.
    pub fn ready() -> ReadinessGate {
        let (handle, gate) = Self::new();
        handle.mark_ready();
        gate
    }

    /// Snapshot of the current store status.
    pub fn status(&self) -> StoreStatus {
        self.rx.borrow().clone()
    }
}

impl ReadinessHandle {
    pub fn mark_ready(&self) {
        self.tx.send_replace(StoreStatus::Ready);
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.tx.send_replace(StoreStatus::Failed(reason.into()));
    }
}
