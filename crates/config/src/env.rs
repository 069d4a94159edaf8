// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `${VAR}` expansion over config file text.
//!
//! Expansion runs before YAML parsing so secrets never appear in checked-in
//! config files. `$$` escapes a literal dollar sign.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("environment variable {0} referenced in config is not set")]
    Unset(String),
    #[error("unterminated ${{...}} reference at byte {0}")]
    Unterminated(usize),
}

/// Expand every `${VAR}` reference in `input` from the process environment.
pub fn expand_env(input: &str) -> Result<String, EnvError> {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expansion with an injectable lookup (for tests).
pub fn expand_with<F>(input: &str, lookup: F) -> Result<String, EnvError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut offset = 0usize;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(stripped) = after.strip_prefix('$') {
            out.push('$');
            offset += pos + 2;
            rest = stripped;
        } else if let Some(inner) = after.strip_prefix('{') {
            let end = inner
                .find('}')
                .ok_or(EnvError::Unterminated(offset + pos))?;
            let name = &inner[..end];
            let value = lookup(name).ok_or_else(|| EnvError::Unset(name.to_string()))?;
            out.push_str(&value);
            offset += pos + 2 + end + 1;
            rest = &inner[end + 1..];
        } else {
            // Bare $ without a brace is literal.
            out.push('$');
            offset += pos + 1;
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
