//! Engine error types.
//!
//! Instruction-level failures surface through [`EngineError`]. The terminal
//! result of a whole run is a [`RunError`], which folds the fatal error (if
//! any) together with the soft command failures collected along the way.

use std::path::PathBuf;

/// Unified error type for instruction execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // -- Dispatch ------------------------------------------------------------
    /// `runWorkflow` named a workflow the config does not define.
    #[error("workflow '{name}' not found")]
    WorkflowNotFound { name: String },

    /// An action received the wrong number of arguments.
    #[error(
        "invalid number of args, expected {}{expected}, received {received}",
        at_least_prefix(.at_least)
    )]
    ArgumentCount {
        expected: usize,
        received: usize,
        at_least: bool,
    },

    /// The first token of an instruction is not a known action.
    #[error("unrecognised action")]
    UnknownAction,

    /// An action failed; carries the action name as context.
    #[error("action '{action}' failed: {source}")]
    Action {
        action: String,
        source: Box<EngineError>,
    },

    // -- Reporters -----------------------------------------------------------
    /// The reporter type is not one this build knows how to call.
    #[error("reporter type '{kind}' is not supported")]
    UnsupportedReporter { kind: String },

    /// A reporter descriptor is malformed (missing or bad endpoint).
    #[error("invalid reporter: {reason}")]
    InvalidReporter { reason: String },

    /// The heartbeat call itself failed.
    #[error("heartbeat request failed: {reason}")]
    Heartbeat { reason: String },

    // -- Run settings --------------------------------------------------------
    /// `setIgnoredErrorCodes` was not given a JSON array of integers.
    #[error("invalid error code list: {0}")]
    InvalidErrorCodes(#[from] serde_json::Error),

    /// An environment variable name or value cannot be represented.
    #[error("invalid environment variable: {reason}")]
    Env { reason: String },

    /// The log file could not be opened or appended to.
    #[error("cannot write log file '{}': {source}", path.display())]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl EngineError {
    /// Attach the name of the action that produced this error.
    pub fn in_action(self, action: impl Into<String>) -> Self {
        Self::Action {
            action: action.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn exact(expected: usize, received: usize) -> Self {
        Self::ArgumentCount {
            expected,
            received,
            at_least: false,
        }
    }

    pub(crate) fn at_least(expected: usize, received: usize) -> Self {
        Self::ArgumentCount {
            expected,
            received,
            at_least: true,
        }
    }
}

fn at_least_prefix(at_least: &bool) -> &'static str {
    if *at_least { "at least " } else { "" }
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

// ---------------------------------------------------------------------------
// Run-level error
// ---------------------------------------------------------------------------

/// Terminal error of a run.
///
/// `detail` is the capitalized composition of the fatal error (if any) and
/// the `failed commands: ...` list, exactly as written to the transcript.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// A fatal error stopped the workflow early.
    #[error("aborted with errors: {detail}")]
    Aborted { detail: String },

    /// The workflow ran to the end but some commands failed.
    #[error("finished with errors: {detail}")]
    Finished { detail: String },
}

impl RunError {
    /// The one-line human summary.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Aborted { .. } => "Aborted with errors",
            Self::Finished { .. } => "Finished with errors",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Aborted { detail } | Self::Finished { detail } => detail,
        }
    }
}
