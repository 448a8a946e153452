//! Transport seam
//!
//! Everything the submission engine needs from a chain connection. A
//! transport delivers status updates over a channel and connection loss
//! through registered callbacks, both from its own tasks.

pub mod local;

use crate::crypto::AccountId;
use crate::dispatch::ErrorRegistry;
use crate::error::Result;
use crate::extrinsic::SignedExtrinsic;
use crate::status::StatusUpdate;
use crate::weight::{BlockWeights, Weight};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use local::LocalTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Invoked by the transport when its connection closes. Must not block.
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Live status feed for one submitted extrinsic.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub updates: mpsc::UnboundedReceiver<StatusUpdate>,
}

#[async_trait]
pub trait Transport: ErrorRegistry {
    /// False for request/response-only connections (plain HTTP).
    fn supports_subscriptions(&self) -> bool;

    /// Submit `extrinsic` and watch its status.
    async fn subscribe(&self, extrinsic: &SignedExtrinsic) -> Result<Subscription>;

    fn unsubscribe(&self, id: SubscriptionId);

    fn on_disconnect(&self, handler: DisconnectHandler) -> ListenerId;

    fn off_disconnect(&self, id: ListenerId);

    /// Next unused nonce for `account`, counting pool transactions.
    async fn next_nonce(&self, account: &AccountId) -> Result<u64>;

    async fn query_weight(&self, extrinsic: &SignedExtrinsic) -> Result<Weight>;

    async fn block_weights(&self) -> Result<BlockWeights>;
}
