//! The workflow interpreter.
//!
//! An [`Engine`] runs one workflow from a [`Config`]: it tokenizes each
//! instruction line, dispatches on the first token, recurses into nested
//! `runWorkflow` calls, and collects soft command failures until the end of
//! the run, where they are folded into the terminal [`RunError`] and sent to
//! the reporters.

use std::time::{Duration, Instant};

use shellflow_vault::Config;
use tracing::{debug, info, warn};

use crate::env::Environment;
use crate::error::{EngineError, Result, RunError};
use crate::logger::LogSink;
use crate::process::{self, OutputMode};
use crate::reporter::{HeartbeatClient, HttpHeartbeat, Report, Reporter};
use crate::scope::Scope;
use crate::tokenizer;

/// Command id that hides the command header and its failure.
const SILENT_ID: &str = "-";
/// Command id that additionally hides the command's output.
const QUIET_ID: &str = "--";

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Everything one run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub elapsed: Duration,
    /// Ids of commands that failed without aborting the run.
    pub failed_commands: Vec<String>,
    pub error: Option<RunError>,
    /// Redacted text of everything the run logged.
    pub transcript: String,
}

impl RunOutcome {
    /// Elapsed time rounded to whole seconds, as logged and reported.
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.as_secs_f64().round() as u64
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> std::result::Result<(), RunError> {
        self.error.map_or(Ok(()), Err)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Interpreter state for a single run.
pub struct Engine {
    config: Config,
    globals: Scope,
    env: Environment,
    failed_commands: Vec<String>,
    ignored_error_codes: Vec<i32>,
    reporters: Vec<Reporter>,
    sink: LogSink,
    heartbeat: Box<dyn HeartbeatClient>,
}

impl Engine {
    /// An engine writing to stdout, using the process environment and real
    /// HTTP heartbeats.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            globals: Scope::new(),
            env: Environment::from_process(),
            failed_commands: Vec::new(),
            ignored_error_codes: Vec::new(),
            reporters: Vec::new(),
            sink: LogSink::stdout(),
            heartbeat: Box::new(HttpHeartbeat::default()),
        }
    }

    /// Replace the whole log sink (e.g. to change redaction rules).
    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn with_heartbeat(mut self, client: Box<dyn HeartbeatClient>) -> Self {
        self.heartbeat = client;
        self
    }

    /// Run `workflow` with positional `args` and report the result.
    ///
    /// The arguments become the global positional variables. The engine is
    /// consumed: a run starts from a fresh interpreter state.
    pub fn run(mut self, workflow: &str, args: &[String]) -> RunOutcome {
        info!(workflow, args = args.len(), "run started");
        self.globals = Scope::from_args(args);

        self.sink.separator();
        let started = Instant::now();
        self.sink.line(&format!("Started at {}", timestamp()));

        let mut result = self.apply_config_settings();
        if result.is_ok() {
            result = self.execute(&format!("runWorkflow {workflow}"), &mut Scope::new());
        }

        let elapsed = started.elapsed();
        let elapsed_seconds = elapsed.as_secs_f64().round() as u64;
        self.sink.separator();
        self.sink.line(&format!(
            "Ended at {} (took {elapsed_seconds} seconds)",
            timestamp()
        ));

        let error = self.compose_error(result.err());
        if let Some(error) = &error {
            self.sink.separator();
            self.sink.line(error.detail());
        }

        self.report(elapsed_seconds, error.as_ref());
        self.sink.separator();

        match &error {
            Some(e) => warn!(workflow, error = %e, "run finished with errors"),
            None => info!(workflow, elapsed_seconds, "run finished"),
        }

        RunOutcome {
            elapsed,
            failed_commands: self.failed_commands,
            error,
            transcript: self.sink.into_transcript(),
        }
    }

    /// Apply `logFilePath` and `reporters` from the config document.
    ///
    /// Every reporter entry is attempted so the valid ones still get the
    /// final report; the first error aborts the run.
    fn apply_config_settings(&mut self) -> Result<()> {
        let mut first_error = None;

        if let Some(path) = self.config.log_file_path.clone() {
            if let Err(e) = self.sink.set_log_file(path) {
                first_error.get_or_insert(e);
            }
        }

        for descriptor in &self.config.reporters {
            match Reporter::from_descriptor(descriptor) {
                Ok(reporter) => self.reporters.push(reporter),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Fold the fatal error and the failed-command list into the run error.
    fn compose_error(&self, fatal: Option<EngineError>) -> Option<RunError> {
        let failed = (!self.failed_commands.is_empty())
            .then(|| format!("failed commands: {}", self.failed_commands.join(", ")));

        let aborted = fatal.is_some();
        let message = match (fatal, failed) {
            (Some(fatal), Some(failed)) => format!("{fatal}; {failed}"),
            (Some(fatal), None) => fatal.to_string(),
            (None, Some(failed)) => failed,
            (None, None) => return None,
        };

        let detail = capitalize(&message);
        Some(if aborted {
            RunError::Aborted { detail }
        } else {
            RunError::Finished { detail }
        })
    }

    fn report(&mut self, elapsed_seconds: u64, error: Option<&RunError>) {
        let report = Report {
            elapsed_seconds,
            summary: error.map(RunError::summary),
            detail: error.map(RunError::detail),
        };

        for reporter in &self.reporters {
            if let Err(e) = reporter.report(&*self.heartbeat, &report) {
                warn!(kind = reporter.kind(), error = %e, "reporter failed");
                self.sink.line(&format!(
                    "Reporter with type '{}' failed: {e}",
                    reporter.kind()
                ));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Instructions
    // -----------------------------------------------------------------------

    /// Execute one instruction line against `locals`.
    ///
    /// Errors carry the failing action's name. Errors raised inside a
    /// nested workflow are already labelled by the action that failed and
    /// pass through `runWorkflow` unchanged.
    pub(crate) fn execute(&mut self, line: &str, locals: &mut Scope) -> Result<()> {
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let tokens = tokenizer::tokenize(line, locals, &self.globals, &self.env);
        let Some((action, args)) = tokens.split_first() else {
            debug!(line, "instruction has no tokens");
            return Ok(());
        };

        if action == "runWorkflow" {
            return self.run_workflow(args, locals);
        }
        self.dispatch(action, args, locals)
            .map_err(|e| e.in_action(action.as_str()))
    }

    fn dispatch(&mut self, action: &str, args: &[String], locals: &mut Scope) -> Result<()> {
        match action {
            "setEnvVar" => {
                exact(args, 2)?;
                self.env.set(&args[0], &args[1])
            }
            "setGlobalVar" => {
                exact(args, 2)?;
                self.globals.set(&args[0], &args[1]);
                Ok(())
            }
            "setLocalVar" => {
                exact(args, 2)?;
                locals.set(&args[0], &args[1]);
                Ok(())
            }
            "runCommand" => {
                at_least(args, 2)?;
                self.run_command(&args[0], &args[1], &args[2..]);
                Ok(())
            }
            "setLogFile" => {
                exact(args, 1)?;
                self.sink.set_log_file(&args[0])
            }
            "addReporter" => {
                at_least(args, 1)?;
                let reporter = Reporter::from_args(&args[0], &args[1..])?;
                debug!(kind = reporter.kind(), "reporter added");
                self.reporters.push(reporter);
                Ok(())
            }
            "setIgnoredErrorCodes" => {
                exact(args, 1)?;
                self.ignored_error_codes = serde_json::from_str(&args[0])?;
                Ok(())
            }
            "print" => {
                self.sink.line(&args.join(" "));
                Ok(())
            }
            "shiftArgVars" => {
                exact(args, 0)?;
                self.shift_arg_vars(locals);
                Ok(())
            }
            _ => Err(EngineError::UnknownAction),
        }
    }

    /// `runWorkflow <name> [args...]`.
    fn run_workflow(&mut self, args: &[String], locals: &Scope) -> Result<()> {
        let script = self
            .lookup_workflow(args)
            .map_err(|e| e.in_action("runWorkflow"))?;

        let mut scope = locals.merged(&Scope::from_args(&args[1..]));
        debug!(workflow = %args[0], depth_vars = scope.len(), "entering workflow");

        for line in script.split('\n') {
            self.execute(line, &mut scope)?;
        }
        Ok(())
    }

    fn lookup_workflow(&self, args: &[String]) -> Result<String> {
        at_least(args, 1)?;
        self.config
            .workflow(&args[0])
            .map(str::to_string)
            .ok_or_else(|| EngineError::WorkflowNotFound {
                name: args[0].clone(),
            })
    }

    /// `runCommand <id> <program> [args...]`. Never fails the instruction;
    /// failures are logged and collected instead.
    fn run_command(&mut self, id: &str, program: &str, args: &[String]) {
        let quiet = id == QUIET_ID;
        let silent = quiet || id == SILENT_ID;

        if !silent {
            self.sink.separator();
            self.sink.line(&format!("Command ID: {id}"));
        }
        if !quiet {
            self.sink.separator();
        }

        let mode = if self.sink.has_log_file() {
            OutputMode::Capture
        } else if quiet {
            OutputMode::Discard
        } else {
            OutputMode::Inherit
        };

        let execution = process::run(program, args, &self.env, mode);
        if !quiet && !execution.output.is_empty() {
            self.sink.raw(&String::from_utf8_lossy(&execution.output));
        }

        let Err(failure) = execution.result else {
            return;
        };
        if silent {
            debug!(program, error = %failure, "silent command failed");
            return;
        }
        if let Some(code) = failure.exit_code() {
            if self.ignored_error_codes.contains(&code) {
                debug!(id, code, "ignored exit code");
                return;
            }
        }

        self.sink.line(&format!("runCommand failed: {failure}"));
        self.failed_commands.push(id.to_string());
    }

    /// Drop the first positional argument of the current workflow.
    fn shift_arg_vars(&mut self, locals: &mut Scope) {
        let Some(all) = locals.get("@") else {
            return;
        };

        let tokens = tokenizer::tokenize(all, &Scope::new(), &self.globals, &self.env);
        if tokens.len() <= 1 {
            locals.set("@", "");
            locals.set("1", "");
        } else {
            locals.extend_from(&Scope::from_args(&tokens[1..]));
            locals.set(tokens.len().to_string(), "");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("workflows", &self.config.workflows.len())
            .field("globals", &self.globals.len())
            .field("failed_commands", &self.failed_commands)
            .field("reporters", &self.reporters)
            .finish_non_exhaustive()
    }
}

fn exact(args: &[String], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(EngineError::exact(expected, args.len()));
    }
    Ok(())
}

fn at_least(args: &[String], expected: usize) -> Result<()> {
    if args.len() < expected {
        return Err(EngineError::at_least(expected, args.len()));
    }
    Ok(())
}

fn timestamp() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::AutoSi, false)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
