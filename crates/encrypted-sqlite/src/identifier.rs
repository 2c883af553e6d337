//! SQL identifier validation.
//!
//! Table and column names are interpolated into SQL text (quoted), so they are
//! restricted to `[A-Za-z_][A-Za-z0-9_$]*`, at most 64 characters.

use crate::error::{Result, SqliteMcpError};

/// Maximum identifier length in characters.
pub const MAX_IDENTIFIER_LEN: usize = 64;

pub fn is_valid_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    identifier.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Validate one identifier; `param` names the argument in the error message.
pub fn validate_identifier(identifier: &str, param: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(SqliteMcpError::invalid_params(format!(
            "{param} cannot be null or empty"
        )));
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(SqliteMcpError::invalid_params(format!(
            "{param} exceeds maximum length of {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if !is_valid_identifier(identifier) {
        return Err(SqliteMcpError::invalid_params(format!(
            "{param} contains invalid characters. Identifiers must start with a letter or \
             underscore and contain only letters, digits, underscores, and dollar signs"
        )));
    }
    Ok(())
}

pub fn validate_identifiers<S: AsRef<str>>(identifiers: &[S], param: &str) -> Result<()> {
    identifiers
        .iter()
        .try_for_each(|id| validate_identifier(id.as_ref(), param))
}

/// Double-quote an identifier, doubling any embedded quote.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
