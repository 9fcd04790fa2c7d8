use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// The length of an HMAC-SHA256 tag in bytes.
pub const SIGNATURE_LEN: usize = 32;

/// The server-held secret that seals session tokens.
///
/// Holds the keyed HMAC state rather than the raw secret; every signature
/// starts from a clone of it.
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
}

impl SigningKey {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(AppError::Internal("Signing key must not be empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| AppError::Internal(format!("Invalid signing key: {}", e)))?;
        Ok(Self { mac })
    }

    /// Computes the HMAC-SHA256 tag of `data`.
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        let mut mac = self.mac.clone();
        mac.update(data);
        let mut tag = [0u8; SIGNATURE_LEN];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        tag
    }

    /// Checks `signature` against `data` in constant time.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.verify_slice(signature).is_ok()
    }
}

/// Encodes bytes as unpadded URL-safe base64.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes unpadded URL-safe base64.
pub fn decode(text: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(text).ok()
}
