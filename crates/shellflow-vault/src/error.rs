//! Vault error types.
//!
//! Every public API in this crate surfaces failures through [`VaultError`].
//! Authentication failures are kept apart from structural corruption so
//! callers can tell a wrong password from a damaged file.

use std::path::PathBuf;

/// Unified error type for the shellflow configuration vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Config file errors -------------------------------------------------
    /// The configuration file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be written.
    #[error("failed to write config file '{}': {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The (decrypted) configuration document is not valid YAML for a
    /// [`Config`](crate::Config).
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// The document parsed but violates a structural rule.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    // -- Crypto errors ------------------------------------------------------
    /// Wrong password, or the payload has been tampered with.
    #[error("authentication failed: wrong password or corrupted data")]
    AuthenticationFailed,

    /// The payload is structurally invalid (too short, misaligned, bad
    /// padding behind a valid MAC).
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },

    /// A supplied KDF salt does not have the required length.
    #[error("invalid salt length: expected {expected} bytes, got {len}")]
    InvalidSalt { len: usize, expected: usize },

    /// Argon2id rejected its parameters or failed internally.
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    /// Encryption failed (CSPRNG failure, cipher setup failure).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    // -- Persistence state errors -------------------------------------------
    /// `save_encrypted` was called on a file that is already encrypted.
    #[error("config file is already encrypted")]
    AlreadyEncrypted,

    /// `save_decrypted` was called on a file that is not encrypted.
    #[error("config file is not encrypted")]
    NotEncrypted,

    /// Writing the plaintext would strip a device binding from a protected
    /// config.
    #[error(
        "config file is marked as protected, refusing to save decrypted as it was opened \
         with a device-bound password"
    )]
    ProtectedRefusal,

    // -- Password errors ----------------------------------------------------
    /// The password provider could not supply a password.
    #[error("password unavailable: {reason}")]
    PasswordUnavailable { reason: String },

    /// The host identity needed for a device-bound password is unavailable.
    #[error("host identity unavailable: {reason}")]
    HostIdentity { reason: String },
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
