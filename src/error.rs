//! Error types for chainwatch

use crate::dispatch::{ErrorDetail, ModuleErrorCode};
use thiserror::Error;

/// Crate-wide error for everything that is not the outcome of a submission.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Transport error: {0}")]
    TransportError(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Registry error: {0}")]
    RegistryError(String),
    #[error("Invalid weight: {0}")]
    WeightError(String),
    #[error("Invalid extrinsic: {0}")]
    InvalidExtrinsic(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Bincode error: {0}")]
    BincodeError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::BincodeError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

/// The ways a submission can fail to reach its resolve criterion.
///
/// `ChainDispatch` is the only on-chain failure. Every other variant is local:
/// the extrinsic may still be live on chain, so resubmitting it needs a fresh
/// signature and nonce.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error(
        "This function is not available if the blockchain API does not support state or event subscriptions"
    )]
    SubscriptionsUnsupported,
    #[error("Submission timed out before a terminal status was observed")]
    Timeout,
    #[error("Extrinsic failed on chain: {0}")]
    ChainDispatch(ErrorDetail),
    #[error("Transport error: {0}")]
    Transport(String),
    /// The pool gave up on the extrinsic (invalid, dropped, finality timeout).
    /// It never executed, so nothing happened on chain.
    #[error("Extrinsic left the transaction pool: {0}")]
    Pool(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Weight query failed: {0}")]
    Weight(String),
}

impl SubmitError {
    /// True for failures observed only locally, including pool rejections.
    pub fn is_local(&self) -> bool {
        !matches!(self, SubmitError::ChainDispatch(_))
    }

    /// The structured module error, when the chain reported one.
    pub fn module_error(&self) -> Option<&ModuleErrorCode> {
        match self {
            SubmitError::ChainDispatch(detail) => detail.module_error.as_ref(),
            _ => None,
        }
    }
}
