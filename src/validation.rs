//! Name validation for values spliced into ARM, Kudu and blob URL paths.
//!
//! Folder names come straight from the remote directory listing, so they are
//! checked before being used to build a request path.

use crate::{BackupError, Result};

/// Characters that would change the meaning of a URL path or query.
const DANGEROUS_CHARS: &str = "/\\?#%";

/// Maximum allowed length for a folder or site name.
const MAX_NAME_LENGTH: usize = 255;

/// Validates a single path segment (a VFS folder name).
///
/// Rejects:
/// - Empty names
/// - `.` and `..`
/// - Excessive length (>255 characters)
/// - Control characters
/// - Path and query separators
///
/// # Example
///
/// ```
/// use logicapps_backup::validation::validate_folder_name;
///
/// assert!(validate_folder_name("order-processing").is_ok());
/// assert!(validate_folder_name("Workflow_01").is_ok());
///
/// assert!(validate_folder_name("").is_err());
/// assert!(validate_folder_name("..").is_err());
/// assert!(validate_folder_name("a/b").is_err());
/// ```
pub fn validate_folder_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BackupError::InvalidName("name cannot be empty".to_string()));
    }

    if name == "." || name == ".." {
        return Err(BackupError::InvalidName(format!(
            "'{}' is a relative path component",
            name
        )));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(BackupError::InvalidName(format!(
            "name exceeds maximum length of {} characters",
            MAX_NAME_LENGTH
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(BackupError::InvalidName(
            "name contains control characters".to_string(),
        ));
    }

    if name.chars().any(|c| DANGEROUS_CHARS.contains(c)) {
        return Err(BackupError::InvalidName(format!(
            "name contains path separators (not allowed: {})",
            DANGEROUS_CHARS
        )));
    }

    Ok(())
}

/// Validates an App Service site name.
///
/// Site names double as DNS labels in the SCM host name, so only ASCII
/// alphanumerics and hyphens are allowed.
pub fn validate_site_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 60 {
        return Err(BackupError::InvalidName(format!(
            "site name must be 1-60 characters: '{}'",
            name
        )));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        || name.starts_with('-')
        || name.ends_with('-')
    {
        return Err(BackupError::InvalidName(format!(
            "site name must be alphanumeric with inner hyphens: '{}'",
            name
        )));
    }

    Ok(())
}
