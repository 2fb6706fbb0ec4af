//! Key and name validation

use crate::contract::{AccountsError, Result};

/// Upper bound on key length when no configuration is at hand
pub const DEFAULT_MAX_KEY_LENGTH: usize = 256;

/// Validate a settings key
///
/// Keys are case-sensitive dotted identifiers: one or more segments separated
/// by '.', each segment non-empty and made of alphanumerics, '_' or '-'.
pub fn validate_key(key: &str, max_len: usize) -> Result<()> {
    if key.is_empty() {
        return Err(AccountsError::validation("settings key cannot be empty"));
    }

    if key.len() > max_len {
        return Err(AccountsError::validation(format!(
            "settings key '{}' exceeds {} bytes",
            key, max_len
        )));
    }

    for segment in key.split('.') {
        if segment.is_empty() {
            return Err(AccountsError::validation(format!(
                "settings key '{}' contains an empty segment",
                key
            )));
        }
        if !segment
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AccountsError::validation(format!(
                "settings key '{}' contains invalid characters. Only alphanumeric, '_', '-' and '.' are allowed",
                key
            )));
        }
    }

    Ok(())
}

/// Validate a provider or service name
///
/// Must start with an alphanumeric character; may contain alphanumerics, '_', '.', '-'.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let Some(first_char) = name.chars().next() else {
        return Err(AccountsError::validation(format!("{} name cannot be empty", kind)));
    };

    if !first_char.is_alphanumeric() {
        return Err(AccountsError::validation(format!(
            "{} name '{}' must start with alphanumeric character",
            kind, name
        )));
    }

    let is_valid = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-');
    if !is_valid {
        return Err(AccountsError::validation(format!(
            "{} name '{}' contains invalid characters",
            kind, name
        )));
    }

    Ok(())
}
