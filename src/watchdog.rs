//! Disconnect watchdog
//!
//! When the transport drops its connection mid-submission, no further status
//! updates will arrive. The watchdog turns the disconnect notification into a
//! synthetic `Error` update built from the last update seen, so the arbiter
//! always gets something well-formed to evaluate.

use crate::arbiter::Arbiter;
use crate::status::{StatusUpdate, TxHash, TxPhase};
use crate::transport::DisconnectHandler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

pub const CONNECTION_ERROR: &str = "connection error";

/// Most recent update of one submission.
///
/// Written by the status feed, read by the watchdog. Only ever replaced whole.
#[derive(Debug, Clone, Default)]
pub struct LatestUpdate {
    cell: Arc<Mutex<Option<StatusUpdate>>>,
}

impl LatestUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `update`, returning the one it replaced.
    pub fn replace(&self, update: StatusUpdate) -> Option<StatusUpdate> {
        self.cell.lock().replace(update)
    }

    pub fn snapshot(&self) -> Option<StatusUpdate> {
        self.cell.lock().clone()
    }
}

pub struct DisconnectWatchdog {
    latest: LatestUpdate,
    arbiter: Arbiter,
    tx_hash: TxHash,
    fired: AtomicBool,
}

impl DisconnectWatchdog {
    pub fn new(latest: LatestUpdate, arbiter: Arbiter, tx_hash: TxHash) -> Arc<Self> {
        Arc::new(Self {
            latest,
            arbiter,
            tx_hash,
            fired: AtomicBool::new(false),
        })
    }

    /// The update fed to the arbiter on disconnect.
    ///
    /// Copies everything but the phase and internal error from the latest
    /// update. If nothing was observed yet, falls back to an empty `Error`
    /// update for this submission's hash.
    pub fn synthesize(&self) -> StatusUpdate {
        match self.latest.snapshot() {
            Some(last) => StatusUpdate {
                phase: TxPhase::Error,
                internal_error: Some(CONNECTION_ERROR.to_string()),
                ..last
            },
            None => StatusUpdate::new(TxPhase::Error, self.tx_hash)
                .with_internal_error(CONNECTION_ERROR),
        }
    }

    /// Handle a disconnect. Only the first call does anything; returns true
    /// if the synthesized update settled the arbiter.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        if self.arbiter.is_settled() {
            return false;
        }

        warn!(
            tx_hash = %hex::encode(self.tx_hash),
            "transport disconnected during submission"
        );
        self.arbiter.feed(&self.synthesize())
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Callback to register with the transport.
    pub fn handler(self: &Arc<Self>) -> DisconnectHandler {
        let watchdog = Arc::clone(self);
        Arc::new(move || {
            watchdog.fire();
        })
    }
}
