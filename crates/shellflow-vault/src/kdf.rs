//! Password-based key derivation with Argon2id.
//!
//! Cost parameters are fixed so that a key derived on one machine can be
//! re-derived on any other: 8 passes over 16 MiB with 8 lanes. The lane
//! count is fixed, not taken from the local core count.

use argon2::{Algorithm, Argon2, Params, Version};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of every KDF salt in bytes.
pub const SALT_LEN: usize = 32;

/// Argon2id time cost (passes over memory).
const T_COST: u32 = 8;

/// Argon2id memory cost in KiB (16 MiB).
const M_COST_KIB: u32 = 16 * 1024;

/// Argon2id parallelism (lanes).
const P_COST: u32 = 8;

/// Key material produced by [`derive_key`] together with the salt that was
/// used, so callers can persist it next to the ciphertext.
#[derive(Clone)]
pub struct DerivedKey {
    pub key: Vec<u8>,
    pub salt: [u8; SALT_LEN],
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"<redacted>")
            .field("key_len", &self.key.len())
            .field("salt", &hex::encode(self.salt))
            .finish()
    }
}

/// Derive `key_len` bytes of key material from `password`.
///
/// With `salt == None` a fresh random salt is generated; otherwise the salt
/// must be exactly [`SALT_LEN`] bytes. Identical inputs always produce
/// identical key bytes.
///
/// # Errors
///
/// Returns [`VaultError::InvalidSalt`] for a salt of the wrong length and
/// [`VaultError::KeyDerivationFailed`] if Argon2 rejects the request.
pub fn derive_key(password: &str, salt: Option<&[u8]>, key_len: usize) -> Result<DerivedKey> {
    let salt: [u8; SALT_LEN] = match salt {
        Some(bytes) => bytes.try_into().map_err(|_| VaultError::InvalidSalt {
            len: bytes.len(),
            expected: SALT_LEN,
        })?,
        None => random_array()?,
    };

    let params = Params::new(M_COST_KIB, T_COST, P_COST, None).map_err(|e| {
        VaultError::KeyDerivationFailed {
            reason: e.to_string(),
        }
    })?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = vec![0u8; key_len];
    argon
        .hash_password_into(password.as_bytes(), &salt, &mut key)
        .map_err(|e| VaultError::KeyDerivationFailed {
            reason: e.to_string(),
        })?;

    tracing::trace!(key_len, "derived key via Argon2id");

    Ok(DerivedKey { key, salt })
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Fill an `N`-byte array from the system CSPRNG.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the system CSPRNG fails.
pub fn random_array<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random bytes".into(),
        })?;
    Ok(buf)
}
