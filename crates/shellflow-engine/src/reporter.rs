//! Heartbeat reporters notified when a run completes.
//!
//! Reporters are best effort: failures are written to the transcript by the
//! engine and never change the run's own result.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::error::{EngineError, Result};

/// Reporter type name for Uptime Kuma push monitors.
pub const UPTIME_KUMA: &str = "uptimeKuma";

/// Message sent with the first heartbeat of a clean run.
const SUCCESS_MESSAGE: &str = "Finished successfully";

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Performs one heartbeat GET request.
pub trait HeartbeatClient: Send {
    fn get(&self, url: &Url) -> Result<()>;
}

/// Blocking HTTP client backed by `reqwest`.
///
/// Requests have no timeout unless one is set: a hung endpoint blocks the
/// run, like a hung command does.
#[derive(Debug, Clone, Default)]
pub struct HttpHeartbeat {
    timeout: Option<Duration>,
}

impl HeartbeatClient for HttpHeartbeat {
    fn get(&self, url: &Url) -> Result<()> {
        let to_error = |e: reqwest::Error| EngineError::Heartbeat {
            reason: e.to_string(),
        };

        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("shellflow/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .map_err(to_error)?;
        let response = client.get(url.clone()).send().map_err(to_error)?;
        tracing::debug!(status = %response.status(), "heartbeat sent");
        response.error_for_status().map_err(to_error)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reporters
// ---------------------------------------------------------------------------

/// What a run tells its reporters.
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    pub elapsed_seconds: u64,
    /// `Aborted with errors` / `Finished with errors`; `None` on success.
    pub summary: Option<&'a str>,
    /// Capitalized error detail; `None` on success.
    pub detail: Option<&'a str>,
}

/// A registered reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reporter {
    /// Uptime Kuma push endpoint.
    UptimeKuma { endpoint: Url },
}

impl Reporter {
    /// Build from `addReporter <type> [args...]`.
    pub fn from_args(kind: &str, args: &[String]) -> Result<Self> {
        match kind {
            UPTIME_KUMA => {
                if args.len() != 1 {
                    return Err(EngineError::exact(2, args.len() + 1));
                }
                Self::uptime_kuma(&args[0])
            }
            other => Err(EngineError::UnsupportedReporter {
                kind: other.to_string(),
            }),
        }
    }

    /// Build from a config `reporters` entry (`type` plus type fields).
    pub fn from_descriptor(descriptor: &BTreeMap<String, String>) -> Result<Self> {
        let kind = descriptor
            .get("type")
            .ok_or_else(|| EngineError::InvalidReporter {
                reason: "missing 'type'".into(),
            })?;
        match kind.as_str() {
            UPTIME_KUMA => {
                let endpoint =
                    descriptor
                        .get("endpoint")
                        .ok_or_else(|| EngineError::InvalidReporter {
                            reason: format!("{UPTIME_KUMA} reporter needs an 'endpoint'"),
                        })?;
                Self::uptime_kuma(endpoint)
            }
            other => Err(EngineError::UnsupportedReporter {
                kind: other.to_string(),
            }),
        }
    }

    fn uptime_kuma(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| EngineError::InvalidReporter {
            reason: format!("endpoint '{endpoint}': {e}"),
        })?;
        Ok(Self::UptimeKuma { endpoint })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UptimeKuma { .. } => UPTIME_KUMA,
        }
    }

    /// Send the completion heartbeats.
    ///
    /// Uptime Kuma gets two calls: an unconditional `up` carrying the
    /// summary, then the final status (`down` with the detail on error).
    /// Only the second call's failure is returned.
    pub fn report(&self, client: &dyn HeartbeatClient, report: &Report<'_>) -> Result<()> {
        match self {
            Self::UptimeKuma { endpoint } => {
                let first = report.summary.unwrap_or(SUCCESS_MESSAGE);
                if let Err(e) = client.get(&heartbeat_url(
                    endpoint,
                    "up",
                    first,
                    report.elapsed_seconds,
                )) {
                    tracing::debug!(error = %e, "first heartbeat failed");
                }

                let url = match report.detail {
                    Some(detail) => heartbeat_url(endpoint, "down", detail, report.elapsed_seconds),
                    None => heartbeat_url(endpoint, "up", first, report.elapsed_seconds),
                };
                client.get(&url)
            }
        }
    }
}

/// `endpoint?status=..&msg=..&ping=..`, keeping any query already present.
pub fn heartbeat_url(endpoint: &Url, status: &str, msg: &str, ping: u64) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("status", status)
        .append_pair("msg", msg)
        .append_pair("ping", &ping.to_string());
    url
}
