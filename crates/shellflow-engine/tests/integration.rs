//! Integration tests for the shellflow-engine crate.
//!
//! Each test builds a config in memory and runs a workflow end to end
//! against real `sh`, `true` and `false` processes.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use shellflow_engine::{
    Engine, EngineError, Environment, HeartbeatClient, LogSink, Redactor, RunError, RunOutcome,
};
use shellflow_vault::Config;
use url::Url;

/// Heartbeat client that records every URL it is asked to fetch.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl HeartbeatClient for Recorder {
    fn get(&self, url: &Url) -> shellflow_engine::Result<()> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(EngineError::Heartbeat {
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}

fn config(workflows: &[(&str, &str)]) -> Config {
    let mut config = Config::default();
    for (name, script) in workflows {
        config.workflows.insert(name.to_string(), script.to_string());
    }
    config
}

fn engine(config: Config) -> Engine {
    Engine::new(config)
        .with_sink(LogSink::silent())
        .with_environment(Environment::from_process())
        .with_heartbeat(Box::new(Recorder::default()))
}

fn run(workflows: &[(&str, &str)], args: &[&str]) -> RunOutcome {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    engine(config(workflows)).run("main", &args)
}

fn detail(outcome: &RunOutcome) -> &str {
    outcome.error.as_ref().map(RunError::detail).unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════
//  Commands and failure handling
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn soft_failure_does_not_stop_the_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("second-ran");
    let outcome = run(
        &[("main", "runCommand first false\nrunCommand second touch $1")],
        &[marker.to_str().unwrap()],
    );

    assert!(marker.exists());
    assert_eq!(outcome.failed_commands, ["first"]);
    assert!(matches!(outcome.error, Some(RunError::Finished { .. })));
    assert_eq!(detail(&outcome), "Failed commands: first");
    assert!(outcome.transcript.contains("Command ID: first\n"));
    assert!(outcome.transcript.contains("runCommand failed: exit status 1\n"));
}

#[test]
fn ignored_exit_codes_are_swallowed() {
    let outcome = run(
        &[(
            "main",
            "setIgnoredErrorCodes [2]\nrunCommand two sh -c 'exit 2'\nrunCommand three sh -c 'exit 3'",
        )],
        &[],
    );
    assert_eq!(outcome.failed_commands, ["three"]);
}

#[test]
fn missing_program_is_a_soft_failure() {
    let outcome = run(
        &[("main", "runCommand ghost no-such-program-2718\nprint still here")],
        &[],
    );
    assert_eq!(outcome.failed_commands, ["ghost"]);
    assert!(outcome.transcript.contains("still here\n"));
}

#[test]
fn silent_ids_hide_headers_output_and_failures() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("run.log");
    let outcome = run(
        &[(
            "main",
            "setLogFile $1\nrunCommand - false\nrunCommand -- sh -c 'echo hidden'\nrunCommand - echo shown",
        )],
        &[log.to_str().unwrap()],
    );

    assert!(outcome.is_success());
    assert!(!outcome.transcript.contains("Command ID"));
    assert!(!outcome.transcript.contains("hidden"));
    assert!(outcome.transcript.contains("shown\n"));
}

#[test]
fn fatal_error_aborts_and_keeps_soft_failures() {
    let outcome = run(
        &[("main", "runCommand early false\nbogus thing\nprint unreachable")],
        &[],
    );

    assert!(matches!(outcome.error, Some(RunError::Aborted { .. })));
    assert_eq!(
        detail(&outcome),
        "Action 'bogus' failed: unrecognised action; failed commands: early"
    );
    assert!(!outcome.transcript.contains("unreachable"));
    assert!(outcome.transcript.contains("Action 'bogus' failed"));
}

#[test]
fn missing_workflow_is_fatal() {
    let outcome = engine(config(&[])).run("nightly", &[]);
    assert_eq!(
        outcome.into_result(),
        Err(RunError::Aborted {
            detail: "Action 'runWorkflow' failed: workflow 'nightly' not found".into()
        })
    );
}

#[test]
fn nested_failure_unwinds_every_caller() {
    let outcome = run(
        &[
            ("main", "runWorkflow middle\nprint after middle"),
            ("middle", "runWorkflow leaf\nprint after leaf"),
            ("leaf", "setLocalVar lonely"),
        ],
        &[],
    );
    assert_eq!(
        detail(&outcome),
        "Action 'setLocalVar' failed: invalid number of args, expected 2, received 1"
    );
    assert!(!outcome.transcript.contains("after"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Variables and recursion
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn recursion_consumes_one_argument_per_call() {
    let outcome = run(
        &[
            ("main", "runWorkflow self x y z"),
            (
                "self",
                "print depth $1 rest $@\nshiftArgVars\nrunWorkflow next$1 $@",
            ),
            ("nexty", "runWorkflow self $@"),
            ("nextz", "runWorkflow self $@"),
            ("next", "print done"),
        ],
        &[],
    );

    assert!(outcome.is_success(), "{:?}", outcome.error);
    let printed: Vec<&str> = outcome
        .transcript
        .lines()
        .filter(|l| l.starts_with("depth") || *l == "done")
        .collect();
    assert_eq!(
        printed,
        [
            "depth x rest x y z",
            "depth y rest y z",
            "depth z rest z",
            "done"
        ]
    );
}

#[test]
fn longest_variable_name_wins() {
    let args = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
    let outcome = run(&[("main", "print $10 $1")], &args);
    assert!(outcome.transcript.contains("\nj a\n"));
}

#[test]
fn globals_are_visible_in_nested_workflows_unless_shadowed() {
    let outcome = run(
        &[
            ("main", "setGlobalVar who world\nrunWorkflow greet\nrunWorkflow shadow"),
            ("greet", "print hello $who"),
            ("shadow", "setLocalVar who local\nprint hello $who"),
        ],
        &[],
    );
    assert!(outcome.transcript.contains("hello world\n"));
    assert!(outcome.transcript.contains("hello local\n"));
}

#[test]
fn env_vars_reach_commands_and_expansion() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("run.log");
    let outcome = run(
        &[(
            "main",
            "setEnvVar SHELLFLOW_GREETING hi\nsetLogFile $1\nrunCommand show sh -c 'printenv SHELLFLOW_GREETING'\nprint env says $SHELLFLOW_GREETING",
        )],
        &[log.to_str().unwrap()],
    );
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert!(outcome.transcript.contains("\nhi\n"));
    assert!(outcome.transcript.contains("env says hi\n"));
}

#[test]
fn engine_environment_is_isolated_from_the_process() {
    let mut env = Environment::empty();
    env.set("PATH", &std::env::var("PATH").unwrap_or_default()).unwrap();
    let outcome = Engine::new(config(&[("main", "setEnvVar ONLY_IN_ENGINE 1")]))
        .with_sink(LogSink::silent())
        .with_environment(env)
        .run("main", &[]);
    assert!(outcome.is_success());
    assert!(std::env::var("ONLY_IN_ENGINE").is_err());
}

#[test]
fn non_utf8_variables_reach_commands() {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    let env = Environment::from_vars([
        (OsString::from("PATH"), std::env::var_os("PATH").unwrap_or_default()),
        (OsString::from("LATIN1"), OsString::from_vec(b"caf\xe9".to_vec())),
    ]);
    let outcome = Engine::new(config(&[(
        "main",
        "runCommand check sh -c 'test $(printenv LATIN1 | wc -c) -eq 5'",
    )]))
    .with_sink(LogSink::silent())
    .with_environment(env)
    .with_heartbeat(Box::new(Recorder::default()))
    .run("main", &[]);

    assert!(outcome.is_success(), "{:?}", outcome.error);
}

// ═══════════════════════════════════════════════════════════════════════
//  Logging
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn log_file_receives_the_whole_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("run.log");
    let outcome = run(
        &[(
            "main",
            "print before\nsetLogFile $1\nrunCommand out sh -c 'echo captured; echo oops >&2'\nprint after",
        )],
        &[log.to_str().unwrap()],
    );

    let written = std::fs::read_to_string(&log).unwrap();
    assert_eq!(written, outcome.transcript);
    assert!(written.contains("before\n"));
    assert!(written.contains("captured\noops\n"));
    assert!(written.contains("after\n"));
    assert!(written.contains("Started at "));
    assert!(written.trim_end().ends_with(&"-".repeat(80)));
}

#[test]
fn config_log_file_path_applies_from_the_start() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("configured.log");
    let mut config = config(&[("main", "print hi")]);
    config.log_file_path = Some(log.clone());

    let outcome = engine(config).run("main", &[]);
    assert_eq!(std::fs::read_to_string(&log).unwrap(), outcome.transcript);
}

#[test]
fn secrets_are_redacted() {
    let outcome = run(&[("main", "print sync :sftp,user=u,pass=p4ss:/srv")], &[]);
    assert!(outcome.transcript.contains("sync :sftp,***:/srv\n"));
    assert!(!outcome.transcript.contains("p4ss"));
}

#[test]
fn custom_redaction_rules_replace_the_defaults() {
    let redactor = Redactor::try_new([(r"token=\w+", "token=***")]).unwrap();
    let outcome = Engine::new(config(&[(
        "main",
        "print GET /?token=abc123\nprint sync :sftp,user=u,pass=p4ss:/srv",
    )]))
    .with_sink(LogSink::silent().with_redactor(redactor))
    .with_heartbeat(Box::new(Recorder::default()))
    .run("main", &[]);

    assert!(outcome.transcript.contains("GET /?token=***\n"));
    assert!(!outcome.transcript.contains("abc123"));
    assert!(outcome.transcript.contains("pass=p4ss"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Reporters
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn reporter_receives_up_then_down() {
    let recorder = Recorder::default();
    let outcome = Engine::new(config(&[(
        "main",
        "addReporter uptimeKuma http://kuma.test/api/push/k\nrunCommand nightly false",
    )]))
    .with_sink(LogSink::silent())
    .with_heartbeat(Box::new(recorder.clone()))
    .run("main", &[]);

    assert!(!outcome.is_success());
    let calls = recorder.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("http://kuma.test/api/push/k?status=up&msg=Finished+with+errors&ping="));
    assert!(calls[1].starts_with(
        "http://kuma.test/api/push/k?status=down&msg=Failed+commands%3A+nightly&ping="
    ));
}

#[test]
fn reporter_failure_is_logged_but_harmless() {
    let recorder = Recorder {
        fail: true,
        ..Default::default()
    };
    let outcome = Engine::new(config(&[(
        "main",
        "addReporter uptimeKuma http://kuma.test/push",
    )]))
    .with_sink(LogSink::silent())
    .with_heartbeat(Box::new(recorder))
    .run("main", &[]);

    assert!(outcome.is_success());
    assert!(outcome.transcript.contains(
        "Reporter with type 'uptimeKuma' failed: heartbeat request failed: connection refused\n"
    ));
}

#[test]
fn unsupported_reporter_is_fatal() {
    let outcome = run(&[("main", "addReporter carrierPigeon coop-7")], &[]);
    assert_eq!(
        detail(&outcome),
        "Action 'addReporter' failed: reporter type 'carrierPigeon' is not supported"
    );
}

#[test]
fn config_reporters_are_registered_and_bad_ones_abort() {
    let recorder = Recorder::default();
    let mut config = config(&[("main", "print should not run")]);
    config.reporters = vec![
        BTreeMap::from([("type".to_string(), "carrierPigeon".to_string())]),
        BTreeMap::from([
            ("type".to_string(), "uptimeKuma".to_string()),
            ("endpoint".to_string(), "http://kuma.test/push".to_string()),
        ]),
    ];

    let outcome = Engine::new(config)
        .with_sink(LogSink::silent())
        .with_heartbeat(Box::new(recorder.clone()))
        .run("main", &[]);

    assert_eq!(detail(&outcome), "Reporter type 'carrierPigeon' is not supported");
    assert!(!outcome.transcript.contains("should not run"));
    let calls = recorder.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].contains("status=down"));
}
