//! The environment handed to child processes and used for `$NAME`
//! expansion.
//!
//! The engine never mutates the real process environment. It snapshots it
//! once into an [`Environment`] and threads that value through the run;
//! `setEnvVar` updates the snapshot and every later command receives it.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

use crate::error::{EngineError, Result};

/// A process environment snapshot.
///
/// Names and values are kept as OS strings so entries that are not UTF-8
/// still reach child processes. Only UTF-8 values take part in `$NAME`
/// expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<OsString, OsString>,
}

impl Environment {
    /// An environment with no variables.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    /// Build from raw `(name, value)` pairs, as [`std::env::vars_os`]
    /// yields them.
    pub fn from_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
        }
    }

    /// The value of `name`, if set and valid UTF-8.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(OsStr::new(name)).and_then(|v| v.to_str())
    }

    /// Set a variable, rejecting names and values the OS cannot carry.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || name.contains('=') || name.contains('\0') {
            return Err(EngineError::Env {
                reason: format!("invalid name '{name}'"),
            });
        }
        if value.contains('\0') {
            return Err(EngineError::Env {
                reason: format!("value of '{name}' contains a NUL byte"),
            });
        }
        self.vars.insert(name.into(), value.into());
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// Replace `$NAME` and `${NAME}` references with their values.
    ///
    /// Unknown names expand to the empty string. `*#$@!?-` and single
    /// digits are one-character names. Malformed braces (`${}` or an
    /// unterminated `${`) are dropped, and a `$` not followed by a name is
    /// kept literally.
    pub fn expand(&self, input: &str) -> String {
        let bytes = input.as_bytes();
        let mut out = String::with_capacity(input.len());
        let mut copied = 0;
        let mut j = 0;

        while j < bytes.len() {
            if bytes[j] == b'$' && j + 1 < bytes.len() {
                out.push_str(&input[copied..j]);
                let (name, width) = shell_name(&input[j + 1..]);
                match name {
                    Some(name) => out.push_str(self.get(name).unwrap_or_default()),
                    // Bad syntax: the consumed characters vanish.
                    None if width > 0 => {}
                    None => out.push('$'),
                }
                j += width;
                copied = j + 1;
            }
            j += 1;
        }
        out.push_str(&input[copied.min(input.len())..]);
        out
    }
}

fn is_special(b: u8) -> bool {
    matches!(b, b'*' | b'#' | b'$' | b'@' | b'!' | b'?' | b'-') || b.is_ascii_digit()
}

fn is_name_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

/// Parse the name following a `$`. Returns the name (if well-formed) and the
/// number of bytes consumed after the `$`.
fn shell_name(s: &str) -> (Option<&str>, usize) {
    let bytes = s.as_bytes();
    if bytes[0] == b'{' {
        if bytes.len() > 2 && is_special(bytes[1]) && bytes[2] == b'}' {
            return (Some(&s[1..2]), 3);
        }
        return match bytes.iter().skip(1).position(|&b| b == b'}') {
            Some(0) => (None, 2),
            Some(end) => (Some(&s[1..end + 1]), end + 2),
            None => (None, 1),
        };
    }
    if is_special(bytes[0]) {
        return (Some(&s[0..1]), 1);
    }
    let len = bytes.iter().take_while(|&&b| is_name_byte(b)).count();
    if len == 0 { (None, 0) } else { (Some(&s[..len]), len) }
}
