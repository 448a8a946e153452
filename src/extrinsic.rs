//! Unsigned calls, signed extrinsics and the signer seam between them.

use crate::crypto::{verify_signature, AccountId, KeyPair};
use crate::error::{ChainError, Result};
use crate::status::TxHash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum encoded extrinsic size in bytes (100KB)
pub const MAX_EXTRINSIC_SIZE: usize = 100_000;

/// A runtime call that has not been signed yet, e.g. `balances.transfer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedCall {
    pub section: String,
    pub method: String,
    pub args: serde_json::Value,
}

impl UnsignedCall {
    pub fn new(section: impl Into<String>, method: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            section: section.into(),
            method: method.into(),
            args,
        }
    }

    /// Bytes covered by the signature: the call plus the nonce it is bound to.
    pub fn signing_payload(&self, nonce: u64) -> Result<Vec<u8>> {
        let args = serde_json::to_string(&self.args)
            .map_err(|e| ChainError::InvalidExtrinsic(format!("Unencodable args: {}", e)))?;
        let payload = bincode::serialize(&(&self.section, &self.method, args, nonce))?;

        if payload.len() > MAX_EXTRINSIC_SIZE {
            return Err(ChainError::InvalidExtrinsic(format!(
                "Extrinsic too large: {} bytes (max: {})",
                payload.len(),
                MAX_EXTRINSIC_SIZE
            )));
        }
        Ok(payload)
    }
}

/// Which nonce to sign with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nonce {
    /// Ask the transport for the account's next nonce.
    #[default]
    Auto,
    Explicit(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedExtrinsic {
    pub call: UnsignedCall,
    pub signer: AccountId,
    pub public_key: Vec<u8>,
    pub nonce: u64,
    pub signature: Vec<u8>,
}

impl SignedExtrinsic {
    pub fn hash(&self) -> TxHash {
        let mut hasher = Sha256::new();
        hasher.update(self.call.section.as_bytes());
        hasher.update(self.call.method.as_bytes());
        hasher.update(self.call.args.to_string().as_bytes());
        hasher.update(self.signer);
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(&self.signature);
        hasher.finalize().into()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    /// Check the signature against the embedded public key and signer.
    pub fn verify(&self) -> Result<()> {
        let derived: AccountId = Sha256::digest(&self.public_key).into();
        if derived != self.signer {
            return Err(ChainError::CryptoError(
                "Public key does not belong to signer".to_string(),
            ));
        }
        let payload = self.call.signing_payload(self.nonce)?;
        verify_signature(&self.public_key, &payload, &self.signature)
    }
}

/// Produces signed extrinsics for one account.
pub trait ExtrinsicSigner: Send + Sync {
    fn account_id(&self) -> AccountId;

    fn sign_call(&self, call: UnsignedCall, nonce: u64) -> Result<SignedExtrinsic>;
}

impl ExtrinsicSigner for KeyPair {
    fn account_id(&self) -> AccountId {
        KeyPair::account_id(self)
    }

    fn sign_call(&self, call: UnsignedCall, nonce: u64) -> Result<SignedExtrinsic> {
        let payload = call.signing_payload(nonce)?;
        let signature = self.sign(&payload)?;
        Ok(SignedExtrinsic {
            call,
            signer: KeyPair::account_id(self),
            public_key: self.public_key_bytes().to_vec(),
            nonce,
            signature: signature.to_vec(),
        })
    }
}
