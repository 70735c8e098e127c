//! Terminal prompts.

use std::io::{self, IsTerminal, Write};

use anyhow::{Context, Result};

/// Whether we can ask the user anything.
pub fn is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// Read one trimmed line after printing `label`.
pub fn line(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read from stdin")?;
    Ok(input.trim().to_string())
}

/// Like [`line`], but an empty answer picks `default` when there is one.
pub fn line_with_default(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => {
            let input = line(&format!("{} [{}]", label, default))?;
            if input.is_empty() {
                Ok(default.to_string())
            } else {
                Ok(input)
            }
        }
        None => line(label),
    }
}

/// Read a password without echoing it.
pub fn password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("{}: ", label))?;
    Ok(password)
}
