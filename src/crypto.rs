//! Cryptographic primitives for noobcash

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Fixed-length digest used for transaction, output and block ids.
pub type Sha256Hash = [u8; 32];

/// SHA-256 of `bytes`.
pub fn hash(bytes: &[u8]) -> Sha256Hash {
    Sha256::digest(bytes).into()
}

/// Compressed SEC1 encoding of a public key.
pub fn public_key_bytes(public_key: &PublicKey) -> [u8; PUBLIC_KEY_SIZE] {
    public_key.serialize()
}

/// Transportable string form of a public key.
pub fn public_key_to_hex(public_key: &PublicKey) -> String {
    hex::encode(public_key.serialize())
}

/// Parse a public key from its transportable string form.
pub fn public_key_from_hex(hex_str: &str) -> Result<PublicKey, ChainError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex public key: {}", e)))?;
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            bytes.len()
        )));
    }
    PublicKey::from_slice(&bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
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

    pub fn public_key_hex(&self) -> String {
        public_key_to_hex(&self.public_key)
    }

    /// Signs a message (which is first hashed using SHA-256) and returns the compact signature bytes.
    pub fn sign(&self, message: &[u8]) -> [u8; COMPACT_SIGNATURE_SIZE] {
        sign(message, &self.secret_key)
    }
}

/// Signs the SHA-256 digest of `message` with `secret_key`.
pub fn sign(message: &[u8], secret_key: &SecretKey) -> [u8; COMPACT_SIGNATURE_SIZE] {
    let message = Message::from_digest(hash(message));
    SECP256K1_CONTEXT
        .sign_ecdsa(&message, secret_key)
        .serialize_compact()
}

/// Verifies a compact ECDSA signature over `message` against `public_key`.
pub fn verify_signature(
    public_key: &PublicKey,
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let message = Message::from_digest(hash(message));

    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}
