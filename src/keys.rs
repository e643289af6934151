//! WireGuard key material.
//!
//! Keys are Curve25519 (x25519-dalek) and travel as standard base64, which is
//! the encoding the daemon expects in its config file.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

pub const KEY_LENGTH: usize = 32;

/// A private/public key pair, both base64-encoded.
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl KeyPair {
    /// Generates a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            private_key: STANDARD.encode(secret.to_bytes()),
            public_key: STANDARD.encode(public.as_bytes()),
        }
    }

    /// Rebuilds a pair from a base64 private key, deriving the public half.
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let bytes = decode_key(private_key)?;
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(Self {
            private_key: private_key.trim().to_string(),
            public_key: STANDARD.encode(public.as_bytes()),
        })
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Generates a random 32-byte preshared key.
pub fn generate_preshared_key() -> Result<String> {
    let mut key = [0u8; KEY_LENGTH];
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(|error| Error::Random(error.to_string()))?;
    Ok(STANDARD.encode(key))
}

/// Checks that a base64 key decodes to exactly 32 bytes.
pub fn validate_key(key: &str) -> Result<()> {
    decode_key(key).map(|_| ())
}

fn decode_key(key: &str) -> Result<[u8; KEY_LENGTH]> {
    let bytes = STANDARD
        .decode(key.trim())
        .map_err(|error| Error::InvalidKey(error.to_string()))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_LENGTH,
            bytes.len()
        ))
    })
}
