//! External command execution.
//!
//! Commands run synchronously with exactly the engine's [`Environment`].
//! Depending on the run's logging setup the child either shares our
//! terminal, has its output discarded, or has stdout and stderr captured
//! together through one pipe so the transcript keeps their interleaving.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};

use tracing::debug;

use crate::env::Environment;

/// Where a child's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Share the parent's stdin, stdout and stderr.
    Inherit,
    /// Capture stdout and stderr combined; stdin is empty.
    Capture,
    /// Discard all output; stdin is empty.
    Discard,
}

/// Why a command did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum CommandFailure {
    /// The process ran and exited with a non-zero code.
    #[error("exit status {code}")]
    Exit { code: i32 },

    /// The process was terminated without an exit code (e.g. by a signal).
    #[error("{status}")]
    Terminated { status: ExitStatus },

    /// The process could not be started or waited on.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CommandFailure {
    /// The exit code, when the process exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code } => Some(*code),
            _ => None,
        }
    }
}

/// Result of one command.
#[derive(Debug)]
pub struct Execution {
    /// Combined output in [`OutputMode::Capture`], empty otherwise.
    pub output: Vec<u8>,
    pub result: Result<(), CommandFailure>,
}

/// Run `program` with `args` to completion.
pub fn run(program: &str, args: &[String], env: &Environment, mode: OutputMode) -> Execution {
    debug!(program, args = args.len(), ?mode, "spawning command");

    let mut cmd = Command::new(program);
    cmd.args(args).env_clear().envs(env.iter());

    let (output, status) = match mode {
        OutputMode::Capture => match capture(cmd) {
            Ok(pair) => pair,
            Err(e) => return failed(e),
        },
        OutputMode::Inherit | OutputMode::Discard => {
            if mode == OutputMode::Discard {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
            }
            match cmd.status() {
                Ok(status) => (Vec::new(), status),
                Err(e) => return failed(e),
            }
        }
    };

    debug!(program, %status, captured = output.len(), "command finished");
    Execution {
        output,
        result: check(status),
    }
}

/// Spawn with stdout and stderr sharing one pipe and read it to the end.
fn capture(mut cmd: Command) -> std::io::Result<(Vec<u8>, ExitStatus)> {
    let (mut reader, writer) = std::io::pipe()?;
    cmd.stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);

    let mut child = cmd.spawn()?;
    // Our copies of the write end must be closed or the read never ends.
    drop(cmd);

    let mut output = Vec::new();
    reader.read_to_end(&mut output)?;
    let status = child.wait()?;
    Ok((output, status))
}

fn check(status: ExitStatus) -> Result<(), CommandFailure> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(CommandFailure::Exit { code }),
        None => Err(CommandFailure::Terminated { status }),
    }
}

fn failed(e: std::io::Error) -> Execution {
    debug!(error = %e, "command could not be run");
    Execution {
        output: Vec::new(),
        result: Err(CommandFailure::Io(e)),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, mode: OutputMode) -> Execution {
        let args = vec!["-c".to_string(), script.to_string()];
        run("sh", &args, &Environment::from_process(), mode)
    }

    #[test]
    fn capture_combines_stdout_and_stderr() {
        let exec = sh("echo out; echo err >&2; echo again", OutputMode::Capture);
        assert!(exec.result.is_ok());
        assert_eq!(String::from_utf8_lossy(&exec.output), "out\nerr\nagain\n");
    }

    #[test]
    fn exit_code_is_reported() {
        let exec = sh("exit 3", OutputMode::Discard);
        let failure = exec.result.unwrap_err();
        assert_eq!(failure.exit_code(), Some(3));
        assert_eq!(failure.to_string(), "exit status 3");
    }

    #[test]
    fn signal_has_no_exit_code() {
        let exec = sh("kill -9 $$", OutputMode::Capture);
        let failure = exec.result.unwrap_err();
        assert!(matches!(failure, CommandFailure::Terminated { .. }));
        assert_eq!(failure.exit_code(), None);
    }

    #[test]
    fn missing_program_is_io_failure() {
        let exec = run(
            "definitely-not-a-real-program-3141",
            &[],
            &Environment::empty(),
            OutputMode::Capture,
        );
        assert!(matches!(exec.result, Err(CommandFailure::Io(_))));
    }

    #[test]
    fn child_sees_exactly_the_given_environment() {
        let mut env = Environment::from_process();
        env.set("SHELLFLOW_MARKER", "42").unwrap();
        let args = vec!["-c".to_string(), "printf %s \"$SHELLFLOW_MARKER\"".to_string()];
        let exec = run("sh", &args, &env, OutputMode::Capture);
        assert_eq!(exec.output, b"42");
    }

    #[test]
    fn non_utf8_variables_reach_the_child() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let env = Environment::from_vars([
            (OsString::from("PATH"), std::env::var_os("PATH").unwrap_or_default()),
            (OsString::from("LATIN1"), OsString::from_vec(b"caf\xe9".to_vec())),
        ]);
        let args = vec!["-c".to_string(), "printf %s \"$LATIN1\"".to_string()];
        let exec = run("sh", &args, &env, OutputMode::Capture);

        assert!(exec.result.is_ok());
        assert_eq!(exec.output, b"caf\xe9");
    }
}
