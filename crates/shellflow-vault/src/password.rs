//! Passwords and the providers that supply them to the config store.

use crate::error::Result;
use crate::store::Identity;

/// An effective password plus whether a device-bound substitution produced
/// it.
#[derive(Clone, PartialEq, Eq)]
pub struct Password {
    secret: String,
    device_bound: bool,
}

impl Password {
    /// A password typed or supplied verbatim.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            device_bound: false,
        }
    }

    /// A password that contains a device secret.
    pub fn device_bound(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            device_bound: true,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn is_device_bound(&self) -> bool {
        self.device_bound
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("secret", &"<redacted>")
            .field("device_bound", &self.device_bound)
            .finish()
    }
}

/// Supplies the password for an encrypted config file.
///
/// The per-file `identity` is passed in so providers can derive
/// device-bound passwords (see [`DeviceBinding`](crate::DeviceBinding)).
pub trait PasswordProvider {
    fn password(&mut self, identity: &Identity) -> Result<Password>;
}

impl<F> PasswordProvider for F
where
    F: FnMut(&Identity) -> Result<Password>,
{
    fn password(&mut self, identity: &Identity) -> Result<Password> {
        self(identity)
    }
}
