use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while accessing the hosts file.
#[derive(Debug, Error)]
pub enum HostsError {
    #[error("hosts file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("permission denied on hosts file: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("hosts file still locked after {attempts} attempts")]
    Locked { attempts: u32 },

    #[error("hosts file is not valid UTF-8")]
    InvalidContent(#[source] std::string::FromUtf8Error),

    #[error("I/O error on hosts file: {0}")]
    Io(#[from] std::io::Error),
}

impl HostsError {
    /// Whether the failure is a configuration problem (wrong path or missing
    /// privileges) rather than contention.
    pub fn is_configuration(&self) -> bool {
        matches!(self, HostsError::NotFound(_) | HostsError::PermissionDenied(_))
    }
}
