//! Config file persistence with optional encryption at rest.
//!
//! # File layout
//!
//! A plaintext config file is just the YAML document. An encrypted one is:
//!
//! ```text
//! [8 bytes:  magic marker]
//! [32 bytes: random per-file identity]
//! [rest:     Crypter payload, see crate::crypter]
//! ```
//!
//! The identity is generated on every encryption and handed to the
//! [`PasswordProvider`] so device-bound passwords differ per file.
//!
//! The store always keeps the original plaintext bytes, never a
//! re-serialization, so comments and formatting survive an
//! encrypt/decrypt round trip.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::crypter::Crypter;
use crate::error::{Result, VaultError};
use crate::kdf;
use crate::password::PasswordProvider;

/// Leading bytes that mark an encrypted config file.
pub const MAGIC: [u8; 8] = [0xC3, 0x5F, 0x1E, 0xA9, 0x73, 0x66, 0x6C, 0x77];

/// Length of the per-file identity in bytes.
pub const IDENTITY_LEN: usize = 32;

/// Random per-file identity stored after the magic marker.
pub type Identity = [u8; IDENTITY_LEN];

/// An opened config file.
pub struct ConfigStore {
    path: PathBuf,
    crypter: Crypter,
    encrypted: bool,
    device_bound: bool,
    plaintext: Vec<u8>,
    config: Config,
}

impl ConfigStore {
    /// Whether the file at `path` carries the encrypted marker. Nothing is
    /// decrypted or parsed.
    pub fn is_encrypted_file(path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let mut header = [0u8; MAGIC.len()];
        let read = std::fs::File::open(path)
            .and_then(|mut file| read_prefix(&mut file, &mut header))
            .map_err(|source| VaultError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(read == MAGIC.len() && header == MAGIC)
    }

    /// Read and parse the config at `path`, decrypting it if it carries the
    /// magic marker.
    ///
    /// `provider` is only consulted for encrypted files. Any failure leaves
    /// nothing behind.
    pub fn open(
        path: impl Into<PathBuf>,
        crypter: Crypter,
        mut provider: impl PasswordProvider,
    ) -> Result<Self> {
        let path = path.into();
        let data = std::fs::read(&path).map_err(|source| VaultError::ConfigRead {
            path: path.clone(),
            source,
        })?;

        let (plaintext, encrypted, device_bound) = if data.starts_with(&MAGIC) {
            let rest = &data[MAGIC.len()..];
            if rest.len() < IDENTITY_LEN {
                return Err(VaultError::InvalidPayload {
                    reason: "encrypted config file is truncated".into(),
                });
            }
            let (identity_bytes, payload) = rest.split_at(IDENTITY_LEN);
            let mut identity = [0u8; IDENTITY_LEN];
            identity.copy_from_slice(identity_bytes);

            let password = provider.password(&identity)?;
            let plaintext = crypter.decrypt(payload, password.secret())?;
            (plaintext, true, password.is_device_bound())
        } else {
            (data, false, false)
        };

        let config = Config::parse(&plaintext)?;

        tracing::debug!(
            path = %path.display(),
            encrypted,
            device_bound,
            workflows = config.workflows.len(),
            "opened config file"
        );

        Ok(Self {
            path,
            crypter,
            encrypted,
            device_bound,
            plaintext,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the store, keeping only the parsed config.
    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn crypter(&self) -> Crypter {
        self.crypter
    }

    /// Whether the file on disk is currently encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Whether the current encryption password came from a device-bound
    /// substitution.
    pub fn opened_device_bound(&self) -> bool {
        self.device_bound
    }

    /// The original document bytes.
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// Encrypt the original plaintext and write it back.
    ///
    /// A fresh identity is generated and passed to `provider`.
    ///
    /// # Errors
    ///
    /// [`VaultError::AlreadyEncrypted`] if the file is already encrypted.
    pub fn save_encrypted(&mut self, mut provider: impl PasswordProvider) -> Result<()> {
        if self.encrypted {
            return Err(VaultError::AlreadyEncrypted);
        }

        let identity: Identity = kdf::random_array()?;
        let password = provider.password(&identity)?;
        let payload = self.crypter.encrypt(&self.plaintext, password.secret())?;

        let mut data = Vec::with_capacity(MAGIC.len() + IDENTITY_LEN + payload.len());
        data.extend_from_slice(&MAGIC);
        data.extend_from_slice(&identity);
        data.extend_from_slice(&payload);
        write_private(&self.path, &data)?;

        self.encrypted = true;
        self.device_bound = password.is_device_bound();

        tracing::info!(
            path = %self.path.display(),
            crypter = self.crypter.name(),
            device_bound = self.device_bound,
            "saved config encrypted"
        );
        Ok(())
    }

    /// Write the original plaintext back, removing the encryption.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotEncrypted`] if the file is not encrypted.
    /// - [`VaultError::ProtectedRefusal`] if the config is `protected` and
    ///   was unlocked with a device-bound password. The file is untouched.
    pub fn save_decrypted(&mut self) -> Result<()> {
        if !self.encrypted {
            return Err(VaultError::NotEncrypted);
        }
        if self.device_bound && self.config.protected {
            tracing::warn!(
                path = %self.path.display(),
                "refusing to strip device binding from protected config"
            );
            return Err(VaultError::ProtectedRefusal);
        }

        write_private(&self.path, &self.plaintext)?;
        self.encrypted = false;
        self.device_bound = false;

        tracing::info!(path = %self.path.display(), "saved config decrypted");
        Ok(())
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .field("crypter", &self.crypter)
            .field("encrypted", &self.encrypted)
            .field("device_bound", &self.device_bound)
            .finish_non_exhaustive()
    }
}

/// Fill as much of `buf` as the reader allows; returns the bytes read.
fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write `data` to `path`, restricting permissions to the owner on Unix.
///
/// A new file is created owner-only; an existing one is narrowed before any
/// data is written.
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let to_write_error = |source| VaultError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(to_write_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(to_write_error)?;
    }

    file.write_all(data).map_err(to_write_error)?;
    Ok(())
}
