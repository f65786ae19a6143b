//! CLI argument definitions for shellflow.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use shellflow_vault::Crypter;

/// shellflow -- run shell workflows from an optionally encrypted config.
#[derive(Debug, Parser)]
#[command(
    name = "shellflow",
    version,
    about = "Run shell workflows from an optionally encrypted config file",
    long_about = "Runs named workflows of shell commands declared in a YAML config file. \
                  The config may be encrypted at rest with a typed password or one bound \
                  to this machine."
)]
pub struct Cli {
    /// Config file path.
    #[arg(long, short, global = true, default_value = "config.yml")]
    pub config: PathBuf,

    /// Cipher used for the encrypted config file.
    #[arg(long, global = true, value_enum, default_value_t = Cipher::Aead)]
    pub cipher: Cipher,

    /// Diagnostic log level on stderr (RUST_LOG takes precedence).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a workflow.
    Run {
        /// Name of the workflow to run.
        workflow: String,

        /// Positional arguments, available as $1..$N and $@.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Config file management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Actions for managing the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Encrypt the config file.
    Encrypt,
    /// Decrypt the config file.
    Decrypt,
}

/// Cipher choice on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Cipher {
    /// AES-256-GCM.
    Aead,
    /// AES-256-CBC with HMAC-SHA256.
    CbcHmac,
}

impl From<Cipher> for Crypter {
    fn from(cipher: Cipher) -> Self {
        match cipher {
            Cipher::Aead => Crypter::Aead,
            Cipher::CbcHmac => Crypter::CbcHmac,
        }
    }
}
