//! Error type shared by every provider operation.

/// Error type for file browser operations.
///
/// Providers never retry and never log these; the caller decides whether to
/// report, retry, or ignore them. Use [`FileBrowserError::is_abort`] to tell a
/// user-initiated cancellation apart from a genuine backend failure.
#[derive(Debug, thiserror::Error)]
pub enum FileBrowserError {
    #[error("Request aborted")]
    Aborted,

    #[error("Request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error(
        "File is {size} bytes, which exceeds the 5,000 MiB ({max_size} bytes) upload limit. \
         Use azcopy or Azure Storage Explorer to upload larger files."
    )]
    FileTooLarge { size: u64, max_size: u64 },

    #[error("No next page")]
    NoNextPage,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Unable to resolve storage details: {0}")]
    StorageDetails(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FileBrowserError {
    /// True when the request was cancelled through its signal.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// HTTP status of a backend rejection, if this error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FileBrowserError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for FileBrowserError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FileBrowserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_distinguishable() {
        assert!(FileBrowserError::Aborted.is_abort());
        assert!(
            !FileBrowserError::Http {
                status: 500,
                body: String::new()
            }
            .is_abort()
        );
    }

    #[test]
    fn test_not_found_only_for_404() {
        let not_found = FileBrowserError::Http {
            status: 404,
            body: "BlobNotFound".to_owned(),
        };
        assert!(not_found.is_not_found());
        assert_eq!(not_found.status(), Some(404));

        let forbidden = FileBrowserError::Http {
            status: 403,
            body: String::new(),
        };
        assert!(!forbidden.is_not_found());
        assert_eq!(FileBrowserError::NoNextPage.status(), None);
    }

    #[test]
    fn test_file_too_large_message_names_limit() {
        let err = FileBrowserError::FileTooLarge {
            size: 5001 * 1024 * 1024,
            max_size: 5000 * 1024 * 1024,
        };
        assert!(err.to_string().contains("5,000 MiB"));
    }
}
