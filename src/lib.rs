//! chainwatch - extrinsic submission and confirmation engine
//!
//! Turns a signed extrinsic into exactly one outcome by racing its live
//! status feed against resolve/reject criteria, a connection-loss watchdog
//! and an optional timeout.
//!
//! # Architecture
//!
//! ## Submission
//! - [`submitter`] - Subscribe, wait, clean up, translate rejections
//! - [`arbiter`] - First-match resolution of a status stream
//! - [`watchdog`] - Synthetic failure update on transport disconnect
//! - [`dispatch`] - Module error translation via runtime metadata
//!
//! ## Chain Model
//! - [`status`] - Phases, events and dispatch errors
//! - [`criteria`] - Resolve/reject predicates
//! - [`extrinsic`] - Calls, signed extrinsics and signers
//! - [`weight`] - Weights and batch sizing
//!
//! ## Cryptography
//! - [`crypto`] - secp256k1 key pairs and signatures
//!
//! ## Transport
//! - [`transport`] - Transport trait and the in-process [`transport::LocalTransport`]
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust,ignore
//! let submitter = Submitter::new(transport).with_config(&config.submit);
//! let alice = KeyPair::from_dev_uri("//Alice")?;
//! let call = UnsignedCall::new("balances", "transfer", json!({ "dest": dest, "value": 1_000 }));
//!
//! match submitter.sign_and_submit(call, &alice, SubmitOptions::new()).await {
//!     Ok(update) => println!("finalized {}", update.tx_hash_hex()),
//!     Err(e) if e.is_local() => eprintln!("unknown fate, re-sign before retrying: {}", e),
//!     Err(e) => eprintln!("failed on chain: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]

// ============================================================================
// Submission
// ============================================================================
pub mod arbiter;
pub mod dispatch;
pub mod submitter;
pub mod watchdog;

// ============================================================================
// Chain Model
// ============================================================================
pub mod criteria;
pub mod extrinsic;
pub mod status;
pub mod weight;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Transport
// ============================================================================
pub mod transport;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use arbiter::{Arbiter, ArbiterSet, Outcome, PendingOutcome};
pub use criteria::{Predicate, ResolvePhase, TerminationCriteria};
pub use error::{ChainError, SubmitError};
pub use status::{ChainEvent, DispatchError, ModuleError, StatusUpdate, TxPhase};
pub use submitter::{SubmitOptions, Submitter};
pub use transport::{LocalTransport, Transport};
