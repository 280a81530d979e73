use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Event log access was denied. Run CrashDetective from an elevated (Administrator) prompt and try again.")]
    PermissionDenied,

    #[error("Event source unavailable: {0}. The log channel or .evtx file is missing on this system.")]
    SourceUnavailable(String),

    #[error("Event log query did not finish within {} seconds. Re-run the search or raise --timeout-secs.", .0.as_secs())]
    Timeout(Duration),

    #[error("Search cancelled before completion.")]
    Cancelled,

    #[error("Executable not found: {}. Check the path and try again.", .0.display())]
    InvalidExecutable(PathBuf),

    #[error("Search period must be one of 2, 3, 7 or 14 days (got {0}).")]
    InvalidDayWindow(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    pub fn status_label(&self) -> &'static str {
        match self {
            SearchError::PermissionDenied => "PERMISSION_DENIED",
            SearchError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            SearchError::Timeout(_) => "TIMEOUT",
            SearchError::Cancelled => "CANCELLED",
            SearchError::InvalidExecutable(_) | SearchError::InvalidDayWindow(_) => "INVALID_CONFIG",
            SearchError::Io(_) => "IO_ERROR",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            SearchError::PermissionDenied => 2,
            SearchError::SourceUnavailable(_) => 3,
            SearchError::Timeout(_) => 4,
            _ => 1,
        }
    }
}
