//! The parsed configuration document.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, VaultError};

/// A shellflow configuration document.
///
/// ```yaml
/// logFilePath: /var/log/shellflow.log
/// protected: true
/// reporters:
///   - type: uptimeKuma
///     endpoint: https://status.example.com/api/push/abc123
/// workflows:
///   backup: |
///     runCommand dump pg_dump app
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Log file that receives the run transcript from the start of the run.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,

    /// Reporter descriptors, each with a `type` key plus type-specific fields.
    #[serde(default)]
    pub reporters: Vec<BTreeMap<String, String>>,

    /// Workflow name to multi-line instruction script.
    #[serde(default)]
    pub workflows: BTreeMap<String, String>,

    /// Forbid plaintext persistence once opened with a device-bound password.
    #[serde(default)]
    pub protected: bool,
}

impl Config {
    /// Parse a configuration document and check its structural rules.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        // An empty document is a valid, empty config.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural rules serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for (index, reporter) in self.reporters.iter().enumerate() {
            if !reporter.contains_key("type") {
                return Err(VaultError::InvalidConfig {
                    reason: format!("reporter #{} has no 'type'", index + 1),
                });
            }
        }
        Ok(())
    }

    /// Look up a workflow script by name.
    pub fn workflow(&self, name: &str) -> Option<&str> {
        self.workflows.get(name).map(String::as_str)
    }
}
