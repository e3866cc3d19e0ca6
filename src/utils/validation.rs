//! Input validation primitives.
//!
//! These replace verbose `ok_or_else` + `Error::validation_invalid_argument`
//! chains at argument boundaries.

use std::path::Path;

use crate::error::{Error, Result};

/// Require a string to be non-empty after trimming.
///
/// Returns the trimmed string on success.
pub fn require_non_empty<'a>(value: &'a str, field: &str, message: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::validation_invalid_argument(field, message, None, None))
    } else {
        Ok(trimmed)
    }
}

/// Require `path` to name an existing regular file.
pub fn require_file(path: &Path, field: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::validation_invalid_argument(
            field,
            format!("Not a file: {}", path.display()),
            Some(path.display().to_string()),
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn require_non_empty_trims_whitespace() {
        let result = require_non_empty("  PBXGroup  ", "field", "msg");
        assert_eq!(result.unwrap(), "PBXGroup");
    }

    #[test]
    fn require_non_empty_fails_for_whitespace_only() {
        let err = require_non_empty("   ", "remove_line", "Cannot be empty").unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
        assert_eq!(err.details["field"], "remove_line");
    }

    #[test]
    fn require_file_rejects_directories() {
        let dir = TempDir::new().unwrap();
        assert!(require_file(dir.path(), "path").is_err());

        let file = NamedTempFile::new().unwrap();
        assert!(require_file(file.path(), "path").is_ok());
    }
}
