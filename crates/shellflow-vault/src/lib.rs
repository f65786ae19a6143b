//! Encrypted configuration store for shellflow.
//!
//! A shellflow config file is a YAML document that may be stored encrypted
//! at rest. The password is either typed by a human or derived from the
//! running machine's identity ("device-bound"), which lets a trusted host
//! unlock its own config without a prompt.
//!
//! # Modules
//!
//! - [`kdf`]: Argon2id key derivation, CSPRNG helpers.
//! - [`crypter`]: AES-256-GCM and AES-256-CBC+HMAC payload encryption.
//! - [`device`]: host identity and device-bound password substitution.
//! - [`password`]: passwords and password providers.
//! - [`config`]: the parsed configuration document.
//! - [`store`]: reading/writing the config file, encrypted or not.
//! - [`error`]: unified error type.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use shellflow_vault::{ConfigStore, Crypter, DeviceBinding, Identity};
//!
//! # fn example() -> shellflow_vault::Result<()> {
//! let binding = DeviceBinding::machine();
//! let store = ConfigStore::open("config.yml", Crypter::Aead, |id: &Identity| {
//!     binding.auto_unlock(id)
//! })?;
//! println!("{} workflows", store.config().workflows.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypter;
pub mod device;
pub mod error;
pub mod kdf;
pub mod password;
pub mod store;

pub use config::Config;
pub use crypter::Crypter;
pub use device::{DEVICE_PLACEHOLDER, DeviceBinding, FixedHostIdentity, HostIdentity, MachineId};
pub use error::{Result, VaultError};
pub use password::{Password, PasswordProvider};
pub use store::{ConfigStore, IDENTITY_LEN, Identity, MAGIC};
