//! Extrinsic status model: phases, chain events and dispatch errors as
//! delivered by a transport's status feed.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type TxHash = [u8; 32];

/// Lifecycle phase of a submitted extrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPhase {
    Future,
    Ready,
    Broadcast,
    InBlock,
    Finalized,
    Invalid,
    Dropped,
    Retracted,
    FinalityTimeout,
    /// Synthesized locally when the transport loses its connection.
    Error,
}

impl TxPhase {
    /// Phases the pool reports when it has given up on the extrinsic.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TxPhase::Invalid | TxPhase::Dropped | TxPhase::FinalityTimeout | TxPhase::Error
        )
    }
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TxPhase::Future => "future",
            TxPhase::Ready => "ready",
            TxPhase::Broadcast => "broadcast",
            TxPhase::InBlock => "in_block",
            TxPhase::Finalized => "finalized",
            TxPhase::Invalid => "invalid",
            TxPhase::Dropped => "dropped",
            TxPhase::Retracted => "retracted",
            TxPhase::FinalityTimeout => "finality_timeout",
            TxPhase::Error => "error",
        };
        f.write_str(name)
    }
}

/// An event emitted by runtime logic while applying the extrinsic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub section: String,
    pub method: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ChainEvent {
    pub fn new(section: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            method: method.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Section names differ in casing between runtimes (`system` vs `System`),
    /// method names do not.
    pub fn is(&self, section: &str, method: &str) -> bool {
        self.section.eq_ignore_ascii_case(section) && self.method == method
    }
}

/// Pallet index and error index of a module error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleError {
    pub pallet_index: u8,
    pub error_index: u8,
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "module error (pallet {}, error {})",
            self.pallet_index, self.error_index
        )
    }
}

/// Structured failure reported by the runtime when dispatching the extrinsic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchError {
    Module(ModuleError),
    BadOrigin,
    CannotLookup,
    Other(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DispatchError::Module(err) => write!(f, "{}", err),
            DispatchError::BadOrigin => write!(f, "Bad origin"),
            DispatchError::CannotLookup => write!(f, "Cannot lookup"),
            DispatchError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Snapshot of an extrinsic's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub phase: TxPhase,
    #[serde(default)]
    pub events: Vec<ChainEvent>,
    #[serde(default)]
    pub dispatch_error: Option<DispatchError>,
    /// Transport-level failure, never produced by the chain itself.
    #[serde(default)]
    pub internal_error: Option<String>,
    #[serde(with = "hex_hash")]
    pub tx_hash: TxHash,
}

impl StatusUpdate {
    pub fn new(phase: TxPhase, tx_hash: TxHash) -> Self {
        Self {
            phase,
            events: Vec::new(),
            dispatch_error: None,
            internal_error: None,
            tx_hash,
        }
    }

    /// The state every submission starts in.
    pub fn future(tx_hash: TxHash) -> Self {
        Self::new(TxPhase::Future, tx_hash)
    }

    pub fn with_event(mut self, event: ChainEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_events(mut self, events: Vec<ChainEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn with_dispatch_error(mut self, error: DispatchError) -> Self {
        self.dispatch_error = Some(error);
        self
    }

    pub fn with_internal_error(mut self, error: impl Into<String>) -> Self {
        self.internal_error = Some(error.into());
        self
    }

    pub fn has_event(&self, section: &str, method: &str) -> bool {
        self.events.iter().any(|e| e.is(section, method))
    }

    pub fn tx_hash_hex(&self) -> String {
        hex::encode(self.tx_hash)
    }
}

mod hex_hash {
    use super::TxHash;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &TxHash, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(hash)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TxHash, D::Error> {
        let s = String::deserialize(d)?;
        let mut hash = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut hash).map_err(D::Error::custom)?;
        Ok(hash)
    }
}
