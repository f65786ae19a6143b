//! The run transcript.
//!
//! Everything a run prints goes through one [`LogSink`]: it is redacted,
//! written to the console, kept in memory for the [`RunOutcome`], and
//! appended to the log file once one is configured. Output produced before
//! that point is buffered and flushed into the file when it is set.
//!
//! This is the user-facing channel. Internal diagnostics use `tracing` and
//! never end up here.
//!
//! [`RunOutcome`]: crate::RunOutcome

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{EngineError, Result};

/// Width of the `----` separator line.
const SEPARATOR_WIDTH: usize = 80;

/// Built-in redaction: the secret part of rclone-style storj/sftp
/// connection strings.
const DEFAULT_RULES: [(&str, &str); 1] = [(r"((?:rclone:)?:(?:storj|sftp),).*?(:\S)", "${1}***${2}")];

// ---------------------------------------------------------------------------
// Redaction
// ---------------------------------------------------------------------------

/// Pattern-based masking applied to every piece of transcript text.
#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<(Regex, String)>,
}

impl Redactor {
    /// A redactor with no rules.
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build from `(pattern, replacement)` pairs. Replacements use `regex`
    /// syntax (`$1`, `${name}`).
    pub fn try_new<'a>(
        rules: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> std::result::Result<Self, regex::Error> {
        let mut compiled = Vec::new();
        for (pattern, replacement) in rules {
            compiled.push((Regex::new(pattern)?, replacement.to_string()));
        }
        Ok(Self { rules: compiled })
    }

    pub fn apply(&self, text: &str) -> String {
        let mut text = text.to_string();
        for (re, replacement) in &self.rules {
            if re.is_match(&text) {
                text = re.replace_all(&text, replacement.as_str()).into_owned();
            }
        }
        text
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::try_new(DEFAULT_RULES).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "built-in redaction rules failed to compile");
            Self::none()
        })
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Console + file + in-memory transcript writer.
pub struct LogSink {
    console: Box<dyn Write + Send>,
    redactor: Redactor,
    log_file: Option<PathBuf>,
    pending: String,
    transcript: String,
}

impl LogSink {
    pub fn new(console: Box<dyn Write + Send>) -> Self {
        Self {
            console,
            redactor: Redactor::default(),
            log_file: None,
            pending: String::new(),
            transcript: String::new(),
        }
    }

    /// A sink writing to standard output.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// A sink that only keeps the in-memory transcript.
    pub fn silent() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Write text as-is (after redaction), without adding a newline.
    pub fn raw(&mut self, text: &str) {
        let text = self.redactor.apply(text);

        self.write_console(&text);
        self.transcript.push_str(&text);

        match &self.log_file {
            Some(path) => {
                if let Err(e) = append(path, &text) {
                    let notice = format!("Failed to write to log file: {e}\n");
                    self.write_console(&notice);
                    self.transcript.push_str(&notice);
                }
            }
            None => self.pending.push_str(&text),
        }
    }

    fn write_console(&mut self, text: &str) {
        if let Err(e) = self
            .console
            .write_all(text.as_bytes())
            .and_then(|()| self.console.flush())
        {
            tracing::debug!(error = %e, "console write failed");
        }
    }

    /// Write one line.
    pub fn line(&mut self, text: &str) {
        self.raw(&format!("{text}\n"));
    }

    pub fn separator(&mut self) {
        self.line(&"-".repeat(SEPARATOR_WIDTH));
    }

    /// Flush the buffered output into `path` and keep appending there.
    ///
    /// The buffer is only cleared when the flush succeeds; on failure the
    /// sink stays in buffering mode.
    pub fn set_log_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        append(&path, &self.pending).map_err(|source| EngineError::LogFile {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(
            path = %path.display(),
            flushed = self.pending.len(),
            "log file set"
        );
        self.pending.clear();
        self.log_file = Some(path);
        Ok(())
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn has_log_file(&self) -> bool {
        self.log_file.is_some()
    }

    /// Everything emitted so far.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn into_transcript(self) -> String {
        self.transcript
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("log_file", &self.log_file)
            .field("pending", &self.pending.len())
            .field("transcript", &self.transcript.len())
            .finish_non_exhaustive()
    }
}

/// Append `text` to `path`, creating it owner-only if missing.
fn append(path: &Path, text: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_redactor_masks_connection_secrets() {
        let r = Redactor::default();
        assert_eq!(
            r.apply("remote :sftp,host=example.org,pass=hunter2:/backups"),
            "remote :sftp,***:/backups"
        );
        assert_eq!(
            r.apply("rclone::storj,access_grant=abc123:bucket"),
            "rclone::storj,***:bucket"
        );
        assert_eq!(r.apply("nothing to hide"), "nothing to hide");
    }

    #[test]
    fn custom_rules_and_bad_patterns() {
        let r = Redactor::try_new([("token=\\w+", "token=***")]).unwrap();
        assert_eq!(r.apply("GET /?token=abc"), "GET /?token=***");
        assert!(Redactor::try_new([("(", "")]).is_err());
    }

    #[test]
    fn output_before_log_file_is_flushed_into_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        std::fs::write(&path, "previous run\n").unwrap();

        let mut sink = LogSink::silent();
        sink.line("first");
        assert!(!sink.has_log_file());
        sink.set_log_file(&path).unwrap();
        sink.line("second");

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "previous run\nfirst\nsecond\n"
        );
        assert_eq!(sink.transcript(), "first\nsecond\n");
        assert_eq!(sink.log_file(), Some(path.as_path()));
    }

    #[test]
    fn unwritable_log_file_keeps_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = LogSink::silent();
        sink.line("kept");

        let err = sink.set_log_file(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::LogFile { .. }));
        assert!(!sink.has_log_file());

        let path = dir.path().join("ok.log");
        sink.set_log_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn file_gets_redacted_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let mut sink = LogSink::silent();
        sink.set_log_file(&path).unwrap();
        sink.raw("copy :sftp,user=me,pass=x:/dst");

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "copy :sftp,***:/dst");
    }

    /// Console that rejects every write.
    struct BrokenConsole;

    impl Write for BrokenConsole {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn broken_console_and_lost_log_file_still_keep_the_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        std::fs::create_dir(&logs).unwrap();

        let mut sink = LogSink::new(Box::new(BrokenConsole));
        sink.set_log_file(logs.join("run.log")).unwrap();
        sink.line("first");
        std::fs::remove_dir_all(&logs).unwrap();
        sink.line("second");

        let transcript = sink.transcript();
        assert!(transcript.starts_with("first\nsecond\n"));
        assert!(transcript.contains("Failed to write to log file: "));
    }

    #[test]
    fn separator_is_eighty_dashes() {
        let mut sink = LogSink::silent();
        sink.separator();
        assert_eq!(sink.transcript(), format!("{}\n", "-".repeat(80)));
    }
}
