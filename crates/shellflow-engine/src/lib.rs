//! Workflow interpreter for shellflow.
//!
//! This crate provides:
//!
//! - **Tokenizer**: variable substitution, environment expansion and
//!   quote-aware splitting of instruction lines via [`tokenizer::tokenize`].
//! - **Scopes**: ordered global/local variable sets via [`Scope`], and the
//!   child-process environment via [`Environment`].
//! - **Engine**: recursive `runWorkflow` dispatch, command execution with
//!   soft failure collection, and the run banner via [`Engine`].
//! - **Transcript**: redacted console/file logging via [`LogSink`].
//! - **Reporters**: completion heartbeats via [`Reporter`].
//!
//! # Workflow language
//!
//! A workflow is a `\n`-separated script. Empty lines and lines starting
//! with `#` are skipped; every other line is `action [args...]`:
//!
//! ```text
//! setLogFile /var/log/backup.log
//! setIgnoredErrorCodes [24]
//! runCommand sync rsync -a /srv/ backup:/srv/
//! runWorkflow notify "backup done"
//! ```
//!
//! `$name` references are replaced longest name first, locals before
//! globals, before environment `$NAME` expansion. Because replacement is
//! textual, a substituted value that itself contains `$x` can be expanded
//! again by a later, shorter variable.

pub mod engine;
pub mod env;
pub mod error;
pub mod logger;
pub mod process;
pub mod reporter;
pub mod scope;
pub mod tokenizer;

pub use engine::{Engine, RunOutcome};
pub use env::Environment;
pub use error::{EngineError, Result, RunError};
pub use logger::{LogSink, Redactor};
pub use reporter::{HeartbeatClient, HttpHeartbeat, Reporter};
pub use scope::Scope;
