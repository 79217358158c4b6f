//! Password-protected storage envelope: PBKDF2-HMAC-SHA256 key derivation,
//! AES-256-GCM encryption, base64 fields. The GCM tag is carried separately
//! from the ciphertext so the envelope layout is explicit on disk.

use aes_gcm::aead::{rand_core::RngCore, Aead, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StoreError;

pub const PBKDF2_ITERATIONS: u32 = 200_000;

#[derive(Serialize, Deserialize)]
pub struct CryptoEnvelope {
    pub v: u8,
    pub salt: String,
    pub iv: String,
    pub tag: String,
    pub data: String,
}

pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

pub fn fresh_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn encrypt_text_with_key(
    text: &str,
    salt: &[u8],
    key: &[u8; 32],
) -> Result<CryptoEnvelope, StoreError> {
    let mut iv = [0u8; 12];
    OsRng.fill_bytes(&mut iv);
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(io_error)?;
    let nonce = Nonce::from_slice(&iv);
    let encrypted = cipher.encrypt(nonce, text.as_bytes()).map_err(io_error)?;

    if encrypted.len() < 16 {
        return Err(StoreError::Io {
            detail: "encryption output too short".to_string(),
        });
    }
    let split_at = encrypted.len() - 16;
    let (data, tag) = encrypted.split_at(split_at);

    Ok(CryptoEnvelope {
        v: 1,
        salt: encode_b64(salt),
        iv: encode_b64(&iv),
        tag: encode_b64(tag),
        data: encode_b64(data),
    })
}

/// Decrypt with an already-derived key. `Ok(None)` means the envelope did not
/// authenticate (wrong password or tampered file), as opposed to an IO fault.
pub fn decrypt_envelope_with_key(
    payload: &CryptoEnvelope,
    key: &[u8; 32],
) -> Result<Option<String>, StoreError> {
    let iv = match decode_b64(payload.iv.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    let tag = match decode_b64(payload.tag.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    let data = match decode_b64(payload.data.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    if iv.len() != 12 || tag.is_empty() || data.is_empty() {
        return Ok(None);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(io_error)?;
    let nonce = Nonce::from_slice(iv.as_slice());
    let mut combined = Vec::with_capacity(data.len() + tag.len());
    combined.extend_from_slice(data.as_slice());
    combined.extend_from_slice(tag.as_slice());

    let decrypted = match cipher.decrypt(nonce, combined.as_slice()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };

    match String::from_utf8(decrypted) {
        Ok(text) => Ok(Some(text)),
        Err(_) => Ok(None),
    }
}

pub fn decode_b64(value: &str) -> Result<Vec<u8>, StoreError> {
    B64.decode(value).map_err(io_error)
}

pub fn encode_b64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

fn io_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Io {
        detail: err.to_string(),
    }
}
