//! Name and password policy for provisioned schemas.

use rand::{Rng as _, distr::Alphanumeric};

use crate::error::ValidationError;

/// MySQL caps schema and user identifiers at 64 characters.
pub const MAX_SCHEMA_NAME_LEN: usize = 64;

pub const GENERATED_PASSWORD_LEN: usize = 24;

/// Physical schema (and user) name for an intent: `<namespace>_<name>`.
pub fn derive_schema_name(namespace: &str, name: &str) -> String {
    format!("{namespace}_{name}")
}

/// Accepts `[A-Za-z0-9_-]{1,64}`.
pub fn validate_schema_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidCharacters {
            name: name.to_string(),
        });
    }
    if name.len() > MAX_SCHEMA_NAME_LEN {
        return Err(ValidationError::TooLong {
            name: name.to_string(),
            len: name.len(),
            max: MAX_SCHEMA_NAME_LEN,
        });
    }
    Ok(())
}

/// Fresh alphanumeric password from the thread-local CSPRNG.
pub fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
