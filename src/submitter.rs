//! Submission coordinator
//!
//! Submits one signed extrinsic and waits for its fate:
//!
//! ```text
//! submit_signed()
//!   ├─ supports_subscriptions()? ── no ──► SubscriptionsUnsupported
//!   ├─ subscribe ──► updates ──┬─► LatestUpdate ──► DisconnectWatchdog
//!   │                          └─► Arbiter ◄──────── (synthetic Error update)
//!   ├─ await Outcome
//!   ├─ unsubscribe + off_disconnect (always, exactly once)
//!   └─ Rejected ──► dispatch::translate
//! ```
//!
//! Each call is a single subscribe-and-wait cycle. Nothing is retried: a
//! failed extrinsic has to be re-signed with a fresh nonce by the caller.

use crate::arbiter::{Arbiter, Outcome};
use crate::config::SubmitConfig;
use crate::criteria::{
    default_reject_on, default_resolve_on, extrinsic_failed, Predicate, TerminationCriteria,
};
use crate::dispatch;
use crate::error::SubmitError;
use crate::extrinsic::{ExtrinsicSigner, Nonce, SignedExtrinsic, UnsignedCall};
use crate::status::StatusUpdate;
use crate::transport::{ListenerId, SubscriptionId, Transport};
use crate::watchdog::{DisconnectWatchdog, LatestUpdate};
use crate::weight::max_batchable_count;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-call overrides. Anything unset falls back to the submitter's defaults.
#[derive(Clone, Default)]
pub struct SubmitOptions {
    pub resolve_on: Option<Predicate>,
    pub reject_on: Option<Predicate>,
    pub timeout: Option<Duration>,
    pub nonce: Nonce,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_on<F>(mut self, f: F) -> Self
    where
        F: Fn(&StatusUpdate) -> bool + Send + Sync + 'static,
    {
        self.resolve_on = Some(Arc::new(f));
        self
    }

    pub fn reject_on<F>(mut self, f: F) -> Self
    where
        F: Fn(&StatusUpdate) -> bool + Send + Sync + 'static,
    {
        self.reject_on = Some(Arc::new(f));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = Nonce::Explicit(nonce);
        self
    }
}

impl fmt::Debug for SubmitOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SubmitOptions")
            .field("resolve_on", &self.resolve_on.is_some())
            .field("reject_on", &self.reject_on.is_some())
            .field("timeout", &self.timeout)
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Releases the subscription and the disconnect listener when dropped, which
/// covers every way out of `submit_signed`, including the caller dropping
/// the future.
struct SubmissionGuard {
    transport: Arc<dyn Transport>,
    subscription: Option<SubscriptionId>,
    listener: Option<ListenerId>,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.transport.unsubscribe(id);
        }
        if let Some(id) = self.listener.take() {
            self.transport.off_disconnect(id);
        }
        debug!("submission resources released");
    }
}

pub struct Submitter {
    transport: Arc<dyn Transport>,
    default_resolve_on: Option<Predicate>,
    default_timeout: Duration,
}

impl Submitter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            default_resolve_on: None,
            default_timeout: Duration::ZERO,
        }
    }

    /// Apply process-wide defaults from configuration.
    pub fn with_config(mut self, config: &SubmitConfig) -> Self {
        self.default_resolve_on = config.resolve_on.map(|phase| phase.predicate());
        self.default_timeout = config.timeout;
        self
    }

    pub fn with_default_resolve_on(mut self, resolve_on: Predicate) -> Self {
        self.default_resolve_on = Some(resolve_on);
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn criteria_for(&self, options: &SubmitOptions) -> TerminationCriteria {
        TerminationCriteria {
            resolve_on: Some(
                options
                    .resolve_on
                    .clone()
                    .or_else(|| self.default_resolve_on.clone())
                    .unwrap_or_else(default_resolve_on),
            ),
            reject_on: Some(options.reject_on.clone().unwrap_or_else(default_reject_on)),
            timeout: options.timeout.unwrap_or(self.default_timeout),
        }
    }

    /// Submit an already signed extrinsic and wait for its outcome.
    pub async fn submit_signed(
        &self,
        extrinsic: &SignedExtrinsic,
        options: SubmitOptions,
    ) -> Result<StatusUpdate, SubmitError> {
        if !self.transport.supports_subscriptions() {
            return Err(SubmitError::SubscriptionsUnsupported);
        }

        let criteria = self.criteria_for(&options);
        let tx_hash = extrinsic.hash();
        let tx_hash_hex = hex::encode(tx_hash);

        let subscription = self
            .transport
            .subscribe(extrinsic)
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        let mut updates = subscription.updates;
        let mut guard = SubmissionGuard {
            transport: self.transport.clone(),
            subscription: Some(subscription.id),
            listener: None,
        };

        let (arbiter, mut pending) = Arbiter::new(criteria);
        let latest = LatestUpdate::new();
        let watchdog = DisconnectWatchdog::new(latest.clone(), arbiter.clone(), tx_hash);
        guard.listener = Some(self.transport.on_disconnect(watchdog.handler()));

        info!(tx_hash = %tx_hash_hex, nonce = extrinsic.nonce, "Submitted extrinsic");

        let mut stream_open = true;
        let outcome = loop {
            tokio::select! {
                biased;
                outcome = &mut pending => break outcome,
                update = updates.recv(), if stream_open => match update {
                    Some(update) => {
                        debug!(tx_hash = %tx_hash_hex, phase = %update.phase, "status update");
                        latest.replace(update.clone());
                        arbiter.feed(&update);
                    }
                    None => {
                        // The timer or the watchdog may still settle it.
                        debug!(tx_hash = %tx_hash_hex, "status stream closed");
                        stream_open = false;
                    }
                },
            }
        };
        drop(guard);

        self.finish(&tx_hash_hex, outcome)
    }

    fn finish(&self, tx_hash: &str, outcome: Outcome) -> Result<StatusUpdate, SubmitError> {
        match outcome {
            Outcome::Resolved(update) => {
                info!(tx_hash, phase = %update.phase, "Extrinsic resolved");
                Ok(update)
            }
            Outcome::TimedOut => {
                warn!(tx_hash, "Extrinsic not settled before timeout; it may still land on chain");
                Err(SubmitError::Timeout)
            }
            Outcome::Rejected(update) => {
                let error = self.rejection_error(&update);
                warn!(tx_hash, phase = %update.phase, "Extrinsic rejected: {}", error);
                Err(error)
            }
        }
    }

    /// Only an update that carries a dispatch error or `ExtrinsicFailed`
    /// counts as an on-chain failure.
    fn rejection_error(&self, update: &StatusUpdate) -> SubmitError {
        if update.dispatch_error.is_some() || extrinsic_failed(update) {
            return SubmitError::ChainDispatch(dispatch::translate(update, self.transport.as_ref()));
        }
        match &update.internal_error {
            Some(internal) => SubmitError::Transport(internal.clone()),
            None => SubmitError::Pool(format!(
                "extrinsic {} at phase {}",
                update.tx_hash_hex(),
                update.phase
            )),
        }
    }

    /// Sign `call` for `signer` and submit it.
    ///
    /// With [`Nonce::Auto`] the transport is asked for the account's next nonce.
    pub async fn sign_and_submit(
        &self,
        call: UnsignedCall,
        signer: &dyn ExtrinsicSigner,
        options: SubmitOptions,
    ) -> Result<StatusUpdate, SubmitError> {
        let nonce = match options.nonce {
            Nonce::Explicit(nonce) => nonce,
            Nonce::Auto => self
                .transport
                .next_nonce(&signer.account_id())
                .await
                .map_err(|e| SubmitError::Transport(e.to_string()))?,
        };
        let extrinsic = signer
            .sign_call(call, nonce)
            .map_err(|e| SubmitError::Signing(e.to_string()))?;

        self.submit_signed(&extrinsic, options).await
    }

    /// How many copies of `extrinsic` fit into one block's batch budget.
    pub async fn max_batchable(&self, extrinsic: &SignedExtrinsic) -> Result<u64, SubmitError> {
        let weight = self
            .transport
            .query_weight(extrinsic)
            .await
            .map_err(|e| SubmitError::Weight(e.to_string()))?;
        let limits = self
            .transport
            .block_weights()
            .await
            .map_err(|e| SubmitError::Weight(e.to_string()))?;

        max_batchable_count(weight, limits).map_err(|e| SubmitError::Weight(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{is_in_block, ResolvePhase};
    use crate::crypto::KeyPair;
    use crate::status::{ChainEvent, TxPhase};
    use crate::transport::LocalTransport;

    fn remark() -> UnsignedCall {
        UnsignedCall::new("system", "remark", serde_json::json!("0x00"))
    }

    fn update(phase: TxPhase) -> StatusUpdate {
        StatusUpdate::new(phase, [0u8; 32])
    }

    #[test]
    fn test_criteria_precedence() {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new());
        let submitter = Submitter::new(transport).with_config(&SubmitConfig {
            resolve_on: Some(ResolvePhase::InBlock),
            timeout: Duration::from_secs(30),
        });

        let defaults = submitter.criteria_for(&SubmitOptions::new());
        assert!(defaults.resolve_on.as_ref().unwrap()(&update(TxPhase::InBlock)));
        assert_eq!(defaults.timeout, Duration::from_secs(30));

        let overridden = submitter.criteria_for(
            &SubmitOptions::new()
                .resolve_on(|u| u.phase == TxPhase::Ready)
                .timeout(Duration::ZERO),
        );
        assert!(overridden.resolve_on.as_ref().unwrap()(&update(TxPhase::Ready)));
        assert!(!overridden.resolve_on.as_ref().unwrap()(&update(TxPhase::InBlock)));
        assert!(overridden.timeout.is_zero());

        let reject = defaults.reject_on.unwrap();
        assert!(reject(
            &update(TxPhase::InBlock).with_event(ChainEvent::new("system", "ExtrinsicFailed"))
        ));
    }

    #[test]
    fn test_rejection_classification() {
        let submitter = Submitter::new(Arc::new(LocalTransport::new()));

        for phase in [TxPhase::Invalid, TxPhase::Dropped, TxPhase::FinalityTimeout] {
            let err = submitter.rejection_error(&update(phase));
            assert!(matches!(err, SubmitError::Pool(_)), "{:?}", err);
            assert!(err.is_local());
        }

        let failed =
            update(TxPhase::InBlock).with_event(ChainEvent::new("system", "ExtrinsicFailed"));
        let err = submitter.rejection_error(&failed);
        assert!(matches!(err, SubmitError::ChainDispatch(_)));
        assert!(!err.is_local());

        let err = submitter.rejection_error(&update(TxPhase::Error).with_internal_error("reset"));
        assert!(matches!(err, SubmitError::Transport(_)));
    }

    #[tokio::test]
    async fn test_explicit_nonce_is_used() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let transport = Arc::new(LocalTransport::scripted(vec![update(TxPhase::InBlock)]));
            let submitter = Submitter::new(transport.clone());
            let alice = KeyPair::from_dev_uri("//Alice").unwrap();

            submitter
                .sign_and_submit(remark(), &alice, SubmitOptions::new().nonce(41).resolve_on(is_in_block))
                .await
                .unwrap();

            assert_eq!(transport.next_nonce(&alice.account_id()).await.unwrap(), 42);
        })
        .await
        .expect("test_explicit_nonce_is_used timed out");
    }

    #[tokio::test]
    async fn test_transport_rejection_surfaces_as_transport_error() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let transport = Arc::new(LocalTransport::scripted(vec![
                update(TxPhase::Ready).with_internal_error("socket reset"),
            ]));
            let submitter = Submitter::new(transport.clone());
            let alice = KeyPair::from_dev_uri("//Alice").unwrap();

            let err = submitter
                .sign_and_submit(remark(), &alice, SubmitOptions::new())
                .await
                .unwrap_err();
            assert!(matches!(err, SubmitError::Transport(ref msg) if msg == "socket reset"));
            assert!(err.is_local());
        })
        .await
        .expect("test_transport_rejection_surfaces_as_transport_error timed out");
    }
}
