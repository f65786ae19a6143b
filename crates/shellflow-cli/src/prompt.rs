//! Hidden terminal password input.

use shellflow_vault::{Result, VaultError};

/// Prompt `"<label>: "` and read a password without echo.
pub fn read_password(label: &str) -> Result<String> {
    let input = rpassword::prompt_password(format!("{label}: ")).map_err(|e| {
        VaultError::PasswordUnavailable {
            reason: e.to_string(),
        }
    })?;
    non_empty(input)
}

/// Prompt for a new password twice and require both entries to match.
pub fn read_new_password() -> anyhow::Result<String> {
    let password = read_password("Password")?;
    let confirmation = read_password("Confirm Password")?;
    confirmed(password, &confirmation)
}

fn non_empty(input: String) -> Result<String> {
    if input.is_empty() {
        return Err(VaultError::PasswordUnavailable {
            reason: "password is empty".into(),
        });
    }
    Ok(input)
}

fn confirmed(password: String, confirmation: &str) -> anyhow::Result<String> {
    if password != confirmation {
        anyhow::bail!("passwords didn't match");
    }
    Ok(password)
}
