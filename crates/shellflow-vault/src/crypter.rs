//! Password-based authenticated encryption of opaque byte blobs.
//!
//! Two interchangeable variants sit behind the [`Crypter`] enum:
//!
//! - [`Crypter::Aead`]: AES-256-GCM via `ring`.
//!   Payload: `salt(32) ‖ nonce(12) ‖ ciphertext ‖ tag(16)`.
//! - [`Crypter::CbcHmac`]: AES-256-CBC with PKCS#7 padding, authenticated
//!   by HMAC-SHA256 over everything before the MAC.
//!   Payload: `salt(32) ‖ iv(16) ‖ ciphertext ‖ mac(32)`.
//!
//! Every call derives a fresh key from the password with a new random salt
//! (see [`crate::kdf`]) and uses a fresh nonce/IV, so encrypting the same
//! plaintext twice never yields the same bytes.
//!
//! Payloads shorter than a variant's minimum are rejected with
//! [`VaultError::InvalidPayload`] before any key material is derived.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey};
use ring::hmac;

use crate::error::{Result, VaultError};
use crate::kdf::{self, SALT_LEN};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the AES-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// AES block size, also the CBC IV length.
pub const BLOCK_LEN: usize = 16;

/// HMAC-SHA256 output length in bytes.
pub const MAC_LEN: usize = 32;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` wants a [`NonceSequence`] for its bound keys; each key here is
/// used for a single seal/open.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Crypter
// ---------------------------------------------------------------------------

/// Encryption scheme used for the on-disk configuration payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Crypter {
    /// AES-256-GCM.
    #[default]
    Aead,
    /// AES-256-CBC + HMAC-SHA256 (encrypt-then-MAC).
    CbcHmac,
}

impl Crypter {
    /// Short human-readable name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aead => "aes-256-gcm",
            Self::CbcHmac => "aes-256-cbc-hmac-sha256",
        }
    }

    /// Smallest payload this variant can have produced.
    pub fn min_payload_len(&self) -> usize {
        match self {
            Self::Aead => SALT_LEN + NONCE_LEN_BYTES + TAG_LEN,
            Self::CbcHmac => SALT_LEN + BLOCK_LEN + BLOCK_LEN + MAC_LEN,
        }
    }

    /// Encrypt `data` under a key derived from `password`.
    pub fn encrypt(&self, data: &[u8], password: &str) -> Result<Vec<u8>> {
        let payload = match self {
            Self::Aead => seal_aead(data, password)?,
            Self::CbcHmac => seal_cbc_hmac(data, password)?,
        };
        tracing::debug!(
            crypter = self.name(),
            plaintext_len = data.len(),
            payload_len = payload.len(),
            "encrypted payload"
        );
        Ok(payload)
    }

    /// Decrypt a payload produced by [`Crypter::encrypt`] of the same variant.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidPayload`] if the payload is structurally invalid.
    /// - [`VaultError::AuthenticationFailed`] for a wrong password or any
    ///   tampering.
    pub fn decrypt(&self, payload: &[u8], password: &str) -> Result<Vec<u8>> {
        let min = self.min_payload_len();
        if payload.len() < min {
            return Err(VaultError::InvalidPayload {
                reason: format!(
                    "{} payload must be at least {min} bytes, got {}",
                    self.name(),
                    payload.len()
                ),
            });
        }

        let data = match self {
            Self::Aead => open_aead(payload, password)?,
            Self::CbcHmac => open_cbc_hmac(payload, password)?,
        };
        tracing::debug!(
            crypter = self.name(),
            payload_len = payload.len(),
            plaintext_len = data.len(),
            "decrypted payload"
        );
        Ok(data)
    }
}

// ---------------------------------------------------------------------------
// AES-256-GCM
// ---------------------------------------------------------------------------

fn seal_aead(data: &[u8], password: &str) -> Result<Vec<u8>> {
    let derived = kdf::derive_key(password, None, KEY_LEN)?;
    let nonce: [u8; NONCE_LEN_BYTES] = kdf::random_array()?;

    let unbound_key =
        UnboundKey::new(AEAD_ALG, &derived.key).map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce));

    // `ring` encrypts in place and appends the tag.
    let mut in_out = data.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    let mut payload = Vec::with_capacity(SALT_LEN + NONCE_LEN_BYTES + in_out.len());
    payload.extend_from_slice(&derived.salt);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&in_out);
    Ok(payload)
}

fn open_aead(payload: &[u8], password: &str) -> Result<Vec<u8>> {
    let (salt, rest) = payload.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN_BYTES);

    let mut nonce = [0u8; NONCE_LEN_BYTES];
    nonce.copy_from_slice(nonce_bytes);

    let derived = kdf::derive_key(password, Some(salt), KEY_LEN)?;
    let unbound_key =
        UnboundKey::new(AEAD_ALG, &derived.key).map_err(|_| VaultError::AuthenticationFailed)?;
    let mut opening_key = OpeningKey::new(unbound_key, SingleNonce::new(nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::AuthenticationFailed)?;
    Ok(plaintext.to_vec())
}

// ---------------------------------------------------------------------------
// AES-256-CBC + HMAC-SHA256
// ---------------------------------------------------------------------------

fn seal_cbc_hmac(data: &[u8], password: &str) -> Result<Vec<u8>> {
    let derived = kdf::derive_key(password, None, KEY_LEN * 2)?;
    let (cipher_key, mac_key) = derived.key.split_at(KEY_LEN);
    let iv: [u8; BLOCK_LEN] = kdf::random_array()?;

    let ciphertext = Aes256CbcEnc::new_from_slices(cipher_key, &iv)
        .map_err(|e| VaultError::EncryptionFailed {
            reason: format!("failed to create AES-256-CBC cipher: {e}"),
        })?
        .encrypt_padded_vec_mut::<Pkcs7>(data);

    let mut payload = Vec::with_capacity(SALT_LEN + BLOCK_LEN + ciphertext.len() + MAC_LEN);
    payload.extend_from_slice(&derived.salt);
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&ciphertext);

    let tag = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, mac_key), &payload);
    payload.extend_from_slice(tag.as_ref());
    Ok(payload)
}

fn open_cbc_hmac(payload: &[u8], password: &str) -> Result<Vec<u8>> {
    let body_len = payload.len() - MAC_LEN;
    if (body_len - SALT_LEN - BLOCK_LEN) % BLOCK_LEN != 0 {
        return Err(VaultError::InvalidPayload {
            reason: "ciphertext is not a whole number of blocks".into(),
        });
    }

    let (body, mac) = payload.split_at(body_len);
    let derived = kdf::derive_key(password, Some(&body[..SALT_LEN]), KEY_LEN * 2)?;
    let (cipher_key, mac_key) = derived.key.split_at(KEY_LEN);

    // The MAC is checked before the ciphertext is touched.
    hmac::verify(&hmac::Key::new(hmac::HMAC_SHA256, mac_key), body, mac)
        .map_err(|_| VaultError::AuthenticationFailed)?;

    let iv = &body[SALT_LEN..SALT_LEN + BLOCK_LEN];
    let ciphertext = &body[SALT_LEN + BLOCK_LEN..];

    Aes256CbcDec::new_from_slices(cipher_key, iv)
        .map_err(|e| VaultError::InvalidPayload {
            reason: format!("failed to create AES-256-CBC cipher: {e}"),
        })?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultError::InvalidPayload {
            reason: "invalid padding".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
