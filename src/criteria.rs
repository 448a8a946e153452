//! Resolve/reject predicates and the termination criteria built from them.
//!
//! Predicates are pure functions over a [`StatusUpdate`]. They carry no state,
//! so the first-match evaluation done by the arbiter stays deterministic.

use crate::status::{StatusUpdate, TxPhase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub type Predicate = Arc<dyn Fn(&StatusUpdate) -> bool + Send + Sync>;

/// Wrap a plain function or closure as a shareable [`Predicate`].
pub fn predicate<F>(f: F) -> Predicate
where
    F: Fn(&StatusUpdate) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn is_ready(update: &StatusUpdate) -> bool {
    update.phase == TxPhase::Ready
}

pub fn is_in_block(update: &StatusUpdate) -> bool {
    update.phase == TxPhase::InBlock
}

pub fn is_finalized(update: &StatusUpdate) -> bool {
    update.phase == TxPhase::Finalized
}

/// `system.ExtrinsicSuccess` was emitted.
pub fn extrinsic_executed(update: &StatusUpdate) -> bool {
    update.has_event("system", "ExtrinsicSuccess")
}

/// `system.ExtrinsicFailed` was emitted.
pub fn extrinsic_failed(update: &StatusUpdate) -> bool {
    update.has_event("system", "ExtrinsicFailed")
}

/// The pool gave up on the extrinsic, or the transport reported a failure.
pub fn is_error(update: &StatusUpdate) -> bool {
    update.phase.is_error() || update.internal_error.is_some()
}

/// Matches when any of `predicates` matches.
pub fn any_of(predicates: Vec<Predicate>) -> Predicate {
    Arc::new(move |update: &StatusUpdate| predicates.iter().any(|p| p(update)))
}

pub fn default_resolve_on() -> Predicate {
    predicate(is_finalized)
}

pub fn default_reject_on() -> Predicate {
    any_of(vec![predicate(extrinsic_failed), predicate(is_error)])
}

/// Named resolve points, usable from config files and the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePhase {
    Ready,
    InBlock,
    Finalized,
    Executed,
}

impl ResolvePhase {
    pub fn predicate(self) -> Predicate {
        match self {
            ResolvePhase::Ready => predicate(is_ready),
            ResolvePhase::InBlock => predicate(is_in_block),
            ResolvePhase::Finalized => predicate(is_finalized),
            ResolvePhase::Executed => predicate(extrinsic_executed),
        }
    }
}

impl FromStr for ResolvePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(ResolvePhase::Ready),
            "in_block" | "in-block" => Ok(ResolvePhase::InBlock),
            "finalized" => Ok(ResolvePhase::Finalized),
            "executed" => Ok(ResolvePhase::Executed),
            other => Err(format!("unknown resolve phase: {}", other)),
        }
    }
}

/// When an arbiter settles. A zero timeout disables the timer.
#[derive(Clone, Default)]
pub struct TerminationCriteria {
    pub resolve_on: Option<Predicate>,
    pub reject_on: Option<Predicate>,
    pub timeout: Duration,
}

impl TerminationCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_on<F>(mut self, f: F) -> Self
    where
        F: Fn(&StatusUpdate) -> bool + Send + Sync + 'static,
    {
        self.resolve_on = Some(predicate(f));
        self
    }

    pub fn reject_on<F>(mut self, f: F) -> Self
    where
        F: Fn(&StatusUpdate) -> bool + Send + Sync + 'static,
    {
        self.reject_on = Some(predicate(f));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for TerminationCriteria {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TerminationCriteria")
            .field("resolve_on", &self.resolve_on.is_some())
            .field("reject_on", &self.reject_on.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
