//! Resolution arbiter
//!
//! Turns a stream of [`StatusUpdate`]s into exactly one [`Outcome`]:
//!
//! ```text
//!   feed(update) ──► reject_on? ──yes──► Rejected(update)
//!                       │ no
//!                       ▼
//!                  resolve_on? ──yes──► Resolved(update)
//!                       │ no
//!                       ▼
//!                    pending ──(timeout elapsed)──► TimedOut
//! ```
//!
//! The first terminal match wins. Later feeds and a late timer are no-ops.
//! Reject is checked before resolve, so an update matching both rejects.

use crate::criteria::TerminationCriteria;
use crate::status::StatusUpdate;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Terminal result of one arbiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Resolved(StatusUpdate),
    /// Carries the update whose payload made the reject predicate match.
    Rejected(StatusUpdate),
    TimedOut,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Resolved(_) => "resolved",
            Outcome::Rejected(_) => "rejected",
            Outcome::TimedOut => "timed_out",
        }
    }
}

struct Slot {
    sender: Option<oneshot::Sender<Outcome>>,
    timer: Option<JoinHandle<()>>,
}

impl Slot {
    fn is_settled(&self) -> bool {
        self.sender.is_none()
    }

    fn settle(&mut self, outcome: Outcome) -> bool {
        let Some(sender) = self.sender.take() else {
            return false;
        };
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        debug!(outcome = outcome.label(), "arbiter settled");
        // A dropped receiver means nobody is waiting; the outcome still counts.
        let _ = sender.send(outcome);
        true
    }
}

/// Feed side of an arbiter. Clones share the same outcome.
#[derive(Clone)]
pub struct Arbiter {
    criteria: Arc<TerminationCriteria>,
    slot: Arc<Mutex<Slot>>,
}

impl Arbiter {
    /// Create an arbiter and the handle its outcome is delivered to.
    ///
    /// With a non-zero timeout the timer task is spawned immediately, so this
    /// must be called from within a tokio runtime in that case.
    pub fn new(criteria: TerminationCriteria) -> (Self, PendingOutcome) {
        let (sender, receiver) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Slot {
            sender: Some(sender),
            timer: None,
        }));

        if !criteria.timeout.is_zero() {
            let timeout = criteria.timeout;
            let timer_slot = Arc::downgrade(&slot);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(slot) = timer_slot.upgrade() {
                    let mut slot = slot.lock();
                    // We are the timer; nothing left to abort.
                    slot.timer = None;
                    slot.settle(Outcome::TimedOut);
                }
            });
            let mut guard = slot.lock();
            if guard.is_settled() {
                handle.abort();
            } else {
                guard.timer = Some(handle);
            }
        }

        let arbiter = Arbiter {
            criteria: Arc::new(criteria),
            slot: slot.clone(),
        };
        (arbiter, PendingOutcome { receiver, slot })
    }

    /// One arbiter per criteria set, all fed from the same stream.
    pub fn fan_out(criteria: Vec<TerminationCriteria>) -> (ArbiterSet, Vec<PendingOutcome>) {
        let (members, pending): (Vec<Arbiter>, Vec<PendingOutcome>) =
            criteria.into_iter().map(Arbiter::new).unzip();
        (ArbiterSet { members }, pending)
    }

    /// Evaluate one update. Returns true if this call produced the outcome.
    pub fn feed(&self, update: &StatusUpdate) -> bool {
        if self.is_settled() {
            return false;
        }

        let outcome = if self.criteria.reject_on.as_ref().is_some_and(|p| p(update)) {
            Outcome::Rejected(update.clone())
        } else if self.criteria.resolve_on.as_ref().is_some_and(|p| p(update)) {
            Outcome::Resolved(update.clone())
        } else {
            return false;
        };

        self.slot.lock().settle(outcome)
    }

    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_settled()
    }
}

/// Several arbiters observing one update stream.
#[derive(Clone, Default)]
pub struct ArbiterSet {
    members: Vec<Arbiter>,
}

impl ArbiterSet {
    /// Feed every member. Returns how many settled on this update.
    pub fn feed(&self, update: &StatusUpdate) -> usize {
        self.members.iter().filter(|a| a.feed(update)).count()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn all_settled(&self) -> bool {
        self.members.iter().all(Arbiter::is_settled)
    }
}

/// Awaitable outcome of an [`Arbiter`].
///
/// Stays pending forever if nothing matches and no timeout was set. Dropping
/// it cancels the timer.
pub struct PendingOutcome {
    receiver: oneshot::Receiver<Outcome>,
    slot: Arc<Mutex<Slot>>,
}

impl PendingOutcome {
    /// Wait for the outcome. Equivalent to awaiting the handle directly.
    pub async fn wait(self) -> Outcome {
        self.await
    }

    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_settled()
    }

    /// Non-blocking check for the outcome.
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        self.receiver.try_recv().ok()
    }
}

impl Future for PendingOutcome {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The sender lives in the slot this handle keeps alive, so it is
            // only ever consumed by a send.
            Poll::Ready(Err(_)) | Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingOutcome {
    fn drop(&mut self) {
        if let Some(timer) = self.slot.lock().timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{default_reject_on, extrinsic_failed, is_finalized};
    use crate::status::{ChainEvent, TxPhase};
    use std::time::{Duration, Instant};

    fn update(phase: TxPhase) -> StatusUpdate {
        StatusUpdate::new(phase, [7u8; 32])
    }

    fn failed_in_block() -> StatusUpdate {
        update(TxPhase::InBlock).with_event(ChainEvent::new("system", "ExtrinsicFailed"))
    }

    #[test]
    fn test_resolves_on_first_match() {
        let (arbiter, mut pending) =
            Arbiter::new(TerminationCriteria::new().resolve_on(is_finalized));

        assert!(!arbiter.feed(&update(TxPhase::Ready)));
        assert!(!arbiter.feed(&update(TxPhase::InBlock)));
        assert!(arbiter.feed(&update(TxPhase::Finalized)));

        assert_eq!(
            pending.try_outcome(),
            Some(Outcome::Resolved(update(TxPhase::Finalized)))
        );
    }

    #[test]
    fn test_reject_takes_precedence_on_same_update() {
        let (arbiter, mut pending) = Arbiter::new(
            TerminationCriteria::new()
                .resolve_on(|_| true)
                .reject_on(|_| true),
        );

        assert!(arbiter.feed(&update(TxPhase::InBlock)));
        assert_eq!(
            pending.try_outcome(),
            Some(Outcome::Rejected(update(TxPhase::InBlock)))
        );
    }

    #[test]
    fn test_feeds_after_settlement_are_ignored() {
        let (arbiter, mut pending) = Arbiter::new(
            TerminationCriteria::new()
                .resolve_on(is_finalized)
                .reject_on(extrinsic_failed),
        );

        assert!(arbiter.feed(&failed_in_block()));
        assert!(!arbiter.feed(&update(TxPhase::Finalized)));
        assert!(!arbiter.feed(&failed_in_block()));

        assert_eq!(pending.try_outcome(), Some(Outcome::Rejected(failed_in_block())));
        assert!(pending.try_outcome().is_none());
    }

    #[test]
    fn test_no_predicates_stays_pending() {
        let (arbiter, mut pending) = Arbiter::new(TerminationCriteria::new());
        for phase in [TxPhase::Ready, TxPhase::InBlock, TxPhase::Finalized] {
            assert!(!arbiter.feed(&update(phase)));
        }
        assert!(!pending.is_settled());
        assert!(pending.try_outcome().is_none());
    }

    #[test]
    fn test_order_is_not_assumed() {
        let (arbiter, mut pending) =
            Arbiter::new(TerminationCriteria::new().resolve_on(is_finalized));

        assert!(arbiter.feed(&update(TxPhase::Finalized)));
        assert!(!arbiter.feed(&update(TxPhase::Ready)));
        assert!(matches!(pending.try_outcome(), Some(Outcome::Resolved(_))));
    }

    #[tokio::test]
    async fn test_timeout_fires_when_nothing_matches() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let started = Instant::now();
            let (arbiter, pending) = Arbiter::new(
                TerminationCriteria::new()
                    .resolve_on(is_finalized)
                    .timeout(Duration::from_millis(100)),
            );
            arbiter.feed(&update(TxPhase::Ready));

            assert_eq!(pending.wait().await, Outcome::TimedOut);
            assert!(started.elapsed() >= Duration::from_millis(100));
            assert!(!arbiter.feed(&update(TxPhase::Finalized)));
        })
        .await
        .expect("test_timeout_fires_when_nothing_matches timed out");
    }

    #[tokio::test]
    async fn test_timer_cancelled_once_settled() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let (arbiter, pending) = Arbiter::new(
                TerminationCriteria::new()
                    .resolve_on(is_finalized)
                    .timeout(Duration::from_millis(50)),
            );
            assert!(arbiter.feed(&update(TxPhase::Finalized)));
            assert!(arbiter.slot.lock().timer.is_none());

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(pending.await, Outcome::Resolved(update(TxPhase::Finalized)));
        })
        .await
        .expect("test_timer_cancelled_once_settled timed out");
    }

    #[tokio::test]
    async fn test_fan_out_settles_independently() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let (set, mut pending) = Arbiter::fan_out(vec![
                TerminationCriteria::new().resolve_on(|u| u.phase == TxPhase::InBlock),
                TerminationCriteria::new()
                    .resolve_on(is_finalized)
                    .reject_on(|u| default_reject_on()(u)),
                TerminationCriteria::new().timeout(Duration::from_millis(20)),
            ]);
            assert_eq!(set.len(), 3);

            assert_eq!(set.feed(&update(TxPhase::InBlock)), 1);
            assert_eq!(set.feed(&update(TxPhase::Finalized)), 1);

            let timed_out = pending.pop().unwrap();
            let finalized = pending.pop().unwrap();
            let in_block = pending.pop().unwrap();

            assert_eq!(in_block.await, Outcome::Resolved(update(TxPhase::InBlock)));
            assert_eq!(finalized.await, Outcome::Resolved(update(TxPhase::Finalized)));
            assert_eq!(timed_out.await, Outcome::TimedOut);
            assert!(set.all_settled());
        })
        .await
        .expect("test_fan_out_settles_independently timed out");
    }
}
