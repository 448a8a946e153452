//! In-process transport
//!
//! Plays the part of a node: hands out subscriptions, replays a scripted
//! status sequence, accepts pushed updates and can simulate a dropped
//! connection. Also counts cleanup calls so callers can check that every
//! subscription and listener was released.

use super::{DisconnectHandler, ListenerId, Subscription, SubscriptionId, Transport};
use crate::crypto::AccountId;
use crate::dispatch::{ErrorRegistry, MetadataRegistry, ModuleErrorMeta};
use crate::error::{ChainError, Result};
use crate::extrinsic::SignedExtrinsic;
use crate::status::{ModuleError, StatusUpdate, TxHash};
use crate::weight::{BlockWeights, Weight};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

const DEFAULT_EXTRINSIC_REF_TIME: u64 = 1_000_000_000;
const DEFAULT_MAX_BLOCK_REF_TIME: u64 = 2_000_000_000_000;

#[derive(Default)]
struct LocalState {
    next_id: u64,
    subscriptions: HashMap<SubscriptionId, (TxHash, mpsc::UnboundedSender<StatusUpdate>)>,
    listeners: HashMap<ListenerId, DisconnectHandler>,
    nonces: HashMap<AccountId, u64>,
    submitted: Vec<TxHash>,
    unsubscribe_calls: usize,
    off_disconnect_calls: usize,
}

pub struct LocalTransport {
    supports_subscriptions: bool,
    script: Vec<StatusUpdate>,
    registry: MetadataRegistry,
    extrinsic_weight: Weight,
    block_weights: BlockWeights,
    state: Mutex<LocalState>,
    subscribed: Notify,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            supports_subscriptions: true,
            script: Vec::new(),
            registry: MetadataRegistry::new(),
            extrinsic_weight: Weight::from_ref_time(DEFAULT_EXTRINSIC_REF_TIME),
            block_weights: BlockWeights {
                max_block: Weight::from_ref_time(DEFAULT_MAX_BLOCK_REF_TIME),
            },
            state: Mutex::new(LocalState::default()),
            subscribed: Notify::new(),
        }
    }

    /// Every subscription immediately receives `script`, rehashed to the
    /// subscribed extrinsic. The stream then stays open.
    pub fn scripted(script: Vec<StatusUpdate>) -> Self {
        Self {
            script,
            ..Self::new()
        }
    }

    /// A transport that behaves like a plain HTTP connection.
    pub fn without_subscriptions() -> Self {
        Self {
            supports_subscriptions: false,
            ..Self::new()
        }
    }

    pub fn with_registry(mut self, registry: MetadataRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_weights(mut self, extrinsic: Weight, block: BlockWeights) -> Self {
        self.extrinsic_weight = extrinsic;
        self.block_weights = block;
        self
    }

    pub fn set_nonce(&self, account: AccountId, nonce: u64) {
        self.state.lock().nonces.insert(account, nonce);
    }

    /// Resolves once a subscription has been opened since the last call.
    pub async fn wait_for_subscription(&self) {
        self.subscribed.notified().await;
    }

    /// Deliver `update` to one subscription. False if it is gone.
    pub fn push(&self, id: SubscriptionId, update: StatusUpdate) -> bool {
        let state = self.state.lock();
        match state.subscriptions.get(&id) {
            Some((hash, sender)) => sender
                .send(StatusUpdate {
                    tx_hash: *hash,
                    ..update
                })
                .is_ok(),
            None => false,
        }
    }

    /// Deliver `update` to every open subscription.
    pub fn push_all(&self, update: StatusUpdate) -> usize {
        let state = self.state.lock();
        state
            .subscriptions
            .values()
            .filter(|(hash, sender)| {
                sender
                    .send(StatusUpdate {
                        tx_hash: *hash,
                        ..update.clone()
                    })
                    .is_ok()
            })
            .count()
    }

    /// End a subscription's stream without unsubscribing it.
    pub fn close_stream(&self, id: SubscriptionId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.subscriptions.get_mut(&id) {
            let (closed, _) = mpsc::unbounded_channel();
            entry.1 = closed;
        }
    }

    /// Simulate a dropped connection. Returns how many listeners were notified.
    pub fn disconnect(&self) -> usize {
        // Handlers may call back into the transport; never run them under the lock.
        let handlers: Vec<DisconnectHandler> =
            self.state.lock().listeners.values().cloned().collect();
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    pub fn active_subscriptions(&self) -> Vec<SubscriptionId> {
        self.state.lock().subscriptions.keys().copied().collect()
    }

    pub fn active_listeners(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.state.lock().unsubscribe_calls
    }

    pub fn off_disconnect_calls(&self) -> usize {
        self.state.lock().off_disconnect_calls
    }

    pub fn submitted(&self) -> Vec<TxHash> {
        self.state.lock().submitted.clone()
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorRegistry for LocalTransport {
    fn resolve_module_error(&self, error: &ModuleError) -> Result<ModuleErrorMeta> {
        self.registry.resolve_module_error(error)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn supports_subscriptions(&self) -> bool {
        self.supports_subscriptions
    }

    async fn subscribe(&self, extrinsic: &SignedExtrinsic) -> Result<Subscription> {
        if !self.supports_subscriptions {
            return Err(ChainError::TransportError(
                "subscriptions are not supported".to_string(),
            ));
        }

        let hash = extrinsic.hash();
        let (sender, updates) = mpsc::unbounded_channel();
        for update in &self.script {
            // The receiver is still in hand, so this cannot fail.
            let _ = sender.send(StatusUpdate {
                tx_hash: hash,
                ..update.clone()
            });
        }

        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = SubscriptionId(state.next_id);
            state.subscriptions.insert(id, (hash, sender));
            state.submitted.push(hash);
            let next = state.nonces.entry(extrinsic.signer).or_insert(0);
            *next = (*next).max(extrinsic.nonce.saturating_add(1));
            id
        };
        debug!(?id, tx_hash = %hex::encode(hash), "local subscription opened");
        self.subscribed.notify_one();

        Ok(Subscription { id, updates })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.lock();
        state.unsubscribe_calls += 1;
        state.subscriptions.remove(&id);
    }

    fn on_disconnect(&self, handler: DisconnectHandler) -> ListenerId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = ListenerId(state.next_id);
        state.listeners.insert(id, handler);
        id
    }

    fn off_disconnect(&self, id: ListenerId) {
        let mut state = self.state.lock();
        state.off_disconnect_calls += 1;
        state.listeners.remove(&id);
    }

    async fn next_nonce(&self, account: &AccountId) -> Result<u64> {
        Ok(self.state.lock().nonces.get(account).copied().unwrap_or(0))
    }

    async fn query_weight(&self, _extrinsic: &SignedExtrinsic) -> Result<Weight> {
        Ok(self.extrinsic_weight)
    }

    async fn block_weights(&self) -> Result<BlockWeights> {
        Ok(self.block_weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::extrinsic::{ExtrinsicSigner, UnsignedCall};
    use crate::status::TxPhase;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn remark(nonce: u64) -> SignedExtrinsic {
        KeyPair::from_dev_uri("//Alice")
            .unwrap()
            .sign_call(UnsignedCall::new("system", "remark", serde_json::json!("hi")), nonce)
            .unwrap()
    }

    #[tokio::test]
    async fn test_scripted_updates_carry_extrinsic_hash() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let transport = LocalTransport::scripted(vec![
                StatusUpdate::new(TxPhase::Ready, [0u8; 32]),
                StatusUpdate::new(TxPhase::InBlock, [0u8; 32]),
            ]);
            let extrinsic = remark(0);
            let mut sub = transport.subscribe(&extrinsic).await.unwrap();

            let first = sub.updates.recv().await.unwrap();
            let second = sub.updates.recv().await.unwrap();
            assert_eq!(first.phase, TxPhase::Ready);
            assert_eq!(second.phase, TxPhase::InBlock);
            assert_eq!(first.tx_hash, extrinsic.hash());

            assert!(transport.push(sub.id, StatusUpdate::new(TxPhase::Finalized, [0u8; 32])));
            assert_eq!(sub.updates.recv().await.unwrap().phase, TxPhase::Finalized);
        })
        .await
        .expect("test_scripted_updates_carry_extrinsic_hash timed out");
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_stream() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let transport = LocalTransport::new();
            let mut sub = transport.subscribe(&remark(0)).await.unwrap();

            transport.unsubscribe(sub.id);
            assert!(sub.updates.recv().await.is_none());
            assert!(!transport.push(sub.id, StatusUpdate::future([0u8; 32])));
            assert_eq!(transport.unsubscribe_calls(), 1);
        })
        .await
        .expect("test_unsubscribe_closes_stream timed out");
    }

    #[tokio::test]
    async fn test_subscribe_advances_nonce() {
        let transport = LocalTransport::new();
        let extrinsic = remark(4);
        transport.subscribe(&extrinsic).await.unwrap();
        assert_eq!(transport.next_nonce(&extrinsic.signer).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_max_nonce_does_not_overflow() {
        let transport = LocalTransport::new();
        let extrinsic = remark(u64::MAX);
        transport.subscribe(&extrinsic).await.unwrap();
        assert_eq!(transport.next_nonce(&extrinsic.signer).await.unwrap(), u64::MAX);
    }

    #[test]
    fn test_disconnect_notifies_registered_listeners() {
        let transport = LocalTransport::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let id = transport.on_disconnect(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(transport.disconnect(), 1);

        transport.off_disconnect(id);
        assert_eq!(transport.disconnect(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.off_disconnect_calls(), 1);
    }
}
