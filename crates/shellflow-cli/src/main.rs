//! CLI entry point for shellflow.
//!
//! This binary provides the `shellflow` command: `run` executes a workflow
//! from the config file, `config encrypt` / `config decrypt` manage the
//! file's encryption at rest.

mod cli;
mod prompt;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use shellflow_engine::Engine;
use shellflow_vault::{
    ConfigStore, Crypter, DEVICE_PLACEHOLDER, DeviceBinding, Identity, Password, VaultError,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigAction};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", capitalize(&format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    if !cli.config.exists() {
        bail!("config file '{}' does not exist", cli.config.display());
    }
    let crypter = Crypter::from(cli.cipher);
    debug!(config = %cli.config.display(), crypter = crypter.name(), "dispatching");

    match cli.command {
        Commands::Run { workflow, args } => cmd_run(&cli.config, crypter, &workflow, &args),
        Commands::Config { action } => match action {
            ConfigAction::Encrypt => cmd_encrypt(&cli.config, crypter),
            ConfigAction::Decrypt => cmd_decrypt(&cli.config, crypter),
        },
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

fn cmd_run(path: &Path, crypter: Crypter, workflow: &str, args: &[String]) -> Result<()> {
    let binding = DeviceBinding::machine();

    // A file bound to this machine alone opens without a prompt.
    let store = match ConfigStore::open(path, crypter, |id: &Identity| binding.auto_unlock(id)) {
        Ok(store) => store,
        Err(e @ (VaultError::AuthenticationFailed | VaultError::HostIdentity { .. })) => {
            debug!(error = %e, "device-bound unlock failed, prompting");
            ConfigStore::open(path, crypter, |id: &Identity| -> shellflow_vault::Result<Password> {
                let raw = prompt::read_password("Password")?;
                binding.resolve(&raw, id)
            })
            .map_err(|e| open_failed(e, crypter))?
        }
        Err(e) => return Err(open_failed(e, crypter)),
    };

    info!(workflow, encrypted = store.is_encrypted(), "starting workflow");
    let outcome = Engine::new(store.into_config()).run(workflow, args);
    info!(
        workflow,
        elapsed_seconds = outcome.elapsed_seconds(),
        failed_commands = outcome.failed_commands.len(),
        "workflow finished"
    );

    // The detail is already in the transcript; keep the final line short.
    match outcome.error {
        Some(e) => bail!("workflow {}", e.summary().to_lowercase()),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: config
// ---------------------------------------------------------------------------

fn cmd_encrypt(path: &Path, crypter: Crypter) -> Result<()> {
    if ConfigStore::is_encrypted_file(path)? {
        return Err(VaultError::AlreadyEncrypted.into());
    }

    let password = prompt::read_new_password()?;
    if DeviceBinding::contains_placeholder(&password) {
        println!(
            "Note: password contains {DEVICE_PLACEHOLDER}; this machine will unlock the file without a prompt"
        );
    }

    let binding = DeviceBinding::machine();
    let mut store = ConfigStore::open(path, crypter, |id: &Identity| binding.auto_unlock(id))
        .map_err(|e| open_failed(e, crypter))?;

    let mut effective: Option<Password> = None;
    store
        .save_encrypted(|id: &Identity| -> shellflow_vault::Result<Password> {
            let resolved = binding.resolve(&password, id)?;
            effective = Some(resolved.clone());
            Ok(resolved)
        })
        .context("failed to encrypt config file")?;

    if let Some(resolved) = effective.filter(Password::is_device_bound) {
        if store.config().protected {
            println!(
                "Config is protected: it can only be decrypted with the explicit password below. Keep it safe:"
            );
            println!("{}", resolved.secret());
        }
    }

    println!("Config file encrypted successfully");
    Ok(())
}

fn cmd_decrypt(path: &Path, crypter: Crypter) -> Result<()> {
    if !ConfigStore::is_encrypted_file(path)? {
        return Err(VaultError::NotEncrypted.into());
    }

    let password = prompt::read_password("Password")?;
    let binding = DeviceBinding::machine();
    let mut store = ConfigStore::open(path, crypter, |id: &Identity| {
        binding.resolve(&password, id)
    })
    .map_err(|e| open_failed(e, crypter))?;

    store
        .save_decrypted()
        .context("failed to decrypt config file")?;

    println!("Config file decrypted successfully");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber on stderr, keeping stdout for the run
/// transcript.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Context for a config file that could not be opened.
///
/// The cipher variant is not recorded in the file, so a rejected password
/// may mean the file was encrypted with a different `--cipher`.
fn open_failed(e: VaultError, crypter: Crypter) -> anyhow::Error {
    let hint = matches!(e, VaultError::AuthenticationFailed).then(|| {
        format!(
            " with {} (if it was encrypted with another --cipher, pass that one)",
            crypter.name()
        )
    });
    anyhow::Error::new(e).context(format!(
        "failed to open config file{}",
        hint.unwrap_or_default()
    ))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
