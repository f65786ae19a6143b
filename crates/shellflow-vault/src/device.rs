//! Device-bound passwords.
//!
//! A password may contain the [`DEVICE_PLACEHOLDER`] token. When it does,
//! every occurrence is replaced with a secret derived from three inputs:
//!
//! 1. a stable host identity (see [`HostIdentity`]),
//! 2. a fixed application seed compiled into the binary,
//! 3. the random per-file identity stored in the encrypted config header.
//!
//! The derivation is `hex(SHA-256(host_id ‖ seed ‖ identity))`. The same
//! machine can therefore unlock its own config file without a human, while
//! the same file copied elsewhere still needs the human part of the password
//! (if any) and the original host identity.
//!
//! # Security Notes
//!
//! - Anyone with access to the same machine can reconstruct the device
//!   secret. Configs marked `protected` are never written back in plaintext
//!   after being opened this way (see [`ConfigStore::save_decrypted`]).
//!
//! [`ConfigStore::save_decrypted`]: crate::ConfigStore::save_decrypted

use ring::digest;

use crate::error::{Result, VaultError};
use crate::password::Password;
use crate::store::Identity;

/// Token inside a password that is replaced by the device secret.
pub const DEVICE_PLACEHOLDER: &str = "$device";

/// Application seed mixed into every device secret. Changing this
/// invalidates every device-bound password ever issued.
const APP_SEED: &[u8] = b"sf1:Qm4t7VZr2cXpL9sWkE3yHfN8dJ6bTgA5uRwY0iKoMhCvPqDxSeGjBnUlFaZ";

// ---------------------------------------------------------------------------
// Host identity
// ---------------------------------------------------------------------------

/// Source of a stable string identifying the running machine.
pub trait HostIdentity: Send + Sync {
    /// Return the host identity.
    fn host_id(&self) -> Result<String>;
}

/// The machine id maintained by the OS.
///
/// Reads `/etc/machine-id`, then `/var/lib/dbus/machine-id`, and falls back
/// to the hostname where neither exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineId;

impl MachineId {
    const ID_FILES: [&'static str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

    fn hostname() -> Option<String> {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/etc/hostname")
                .map(|s| s.trim().to_string())
                .or_else(|_| std::env::var("HOSTNAME"))
                .or_else(|_| std::env::var("HOST"))
                .ok()
        }

        #[cfg(not(unix))]
        {
            std::env::var("COMPUTERNAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .ok()
        }
    }
}

impl HostIdentity for MachineId {
    fn host_id(&self) -> Result<String> {
        for path in Self::ID_FILES {
            if let Ok(id) = std::fs::read_to_string(path) {
                let id = id.trim();
                if !id.is_empty() {
                    tracing::debug!(source = path, "resolved host identity");
                    return Ok(id.to_string());
                }
            }
        }

        match Self::hostname() {
            Some(name) if !name.is_empty() => {
                tracing::debug!(source = "hostname", "resolved host identity");
                Ok(name)
            }
            _ => Err(VaultError::HostIdentity {
                reason: "no machine id or hostname available".into(),
            }),
        }
    }
}

/// A host identity fixed at construction time.
#[derive(Debug, Clone)]
pub struct FixedHostIdentity(pub String);

impl HostIdentity for FixedHostIdentity {
    fn host_id(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Device binding
// ---------------------------------------------------------------------------

/// Resolves raw passwords, substituting the device secret for the
/// placeholder.
pub struct DeviceBinding {
    host: Box<dyn HostIdentity>,
}

impl DeviceBinding {
    /// Bind to the given host identity source.
    pub fn new(host: impl HostIdentity + 'static) -> Self {
        Self {
            host: Box::new(host),
        }
    }

    /// Bind to the OS machine id.
    pub fn machine() -> Self {
        Self::new(MachineId)
    }

    /// Whether `raw` asks for device binding.
    pub fn contains_placeholder(raw: &str) -> bool {
        raw.contains(DEVICE_PLACEHOLDER)
    }

    /// The device secret for a given file identity.
    pub fn device_secret(&self, identity: &Identity) -> Result<String> {
        let host_id = self.host.host_id()?;

        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(host_id.as_bytes());
        ctx.update(APP_SEED);
        ctx.update(identity);
        Ok(hex::encode(ctx.finish()))
    }

    /// Turn a raw password into the effective one.
    ///
    /// Without the placeholder the password is returned unchanged and not
    /// device-bound.
    pub fn resolve(&self, raw: &str, identity: &Identity) -> Result<Password> {
        if !Self::contains_placeholder(raw) {
            return Ok(Password::new(raw));
        }
        let secret = self.device_secret(identity)?;
        Ok(Password::device_bound(raw.replace(DEVICE_PLACEHOLDER, &secret)))
    }

    /// The password consisting of the device secret alone.
    pub fn auto_unlock(&self, identity: &Identity) -> Result<Password> {
        self.resolve(DEVICE_PLACEHOLDER, identity)
    }
}

impl std::fmt::Debug for DeviceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBinding").finish_non_exhaustive()
    }
}
