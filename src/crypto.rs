//! Key pairs and signatures used to sign extrinsics

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// Shared signing/verification context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// On-chain account identifier: SHA-256 of the compressed public key.
pub type AccountId = [u8; 32];

/// Hex form of an account, without a `0x` prefix.
pub fn account_to_hex(account: &AccountId) -> String {
    hex::encode(account)
}

/// Parse an account from hex. A leading `0x` is accepted.
pub fn account_from_hex(hex_str: &str) -> Result<AccountId, ChainError> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex account: {}", e)))?;
    if bytes.len() != 32 {
        return Err(ChainError::CryptoError(format!(
            "Account must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    bytes
        .try_into()
        .map_err(|_| ChainError::CryptoError("Failed to convert bytes into account".to_string()))
}

/// A secp256k1 key pair that signs extrinsics for one account.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a fresh random key pair from the OS random number generator.
    pub fn generate() -> Result<Self, ChainError> {
        let secret_key = SecretKey::new(&mut OsRng);
        Ok(Self::from_secret_key(secret_key))
    }

    /// Derives the public half from an existing secret key.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Builds a key pair from 32 raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Deterministic development key from a URI such as `//Alice`.
    ///
    /// Not for production funds: anyone knowing the URI knows the key.
    pub fn from_dev_uri(uri: &str) -> Result<Self, ChainError> {
        if !uri.starts_with("//") || uri.len() <= 2 {
            return Err(ChainError::CryptoError(format!(
                "Development URI must look like //Name, got {:?}",
                uri
            )));
        }
        let seed = Sha256::digest(uri.as_bytes());
        Self::from_secret_bytes(&seed)
    }

    /// The signing account: SHA-256 of the compressed public key.
    pub fn account_id(&self) -> AccountId {
        Sha256::digest(self.public_key.serialize()).into()
    }

    /// The public key in compressed form, as carried by signed extrinsics.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Sign the SHA-256 digest of `message`, returning a compact signature.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], ChainError> {
        let digest = Sha256::digest(message);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))?;

        Ok(SECP256K1_CONTEXT
            .sign_ecdsa(&message, &self.secret_key)
            .serialize_compact())
    }
}

/// Verify a compact ECDSA signature over the SHA-256 digest of `message`.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;
    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))?;
    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}
