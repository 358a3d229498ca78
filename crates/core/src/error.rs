use std::path::PathBuf;

/// Failures surfaced by discovery, browsing and downloading
///
/// `NotFound`, `InvalidCriteria` and `Config` end the run. The others are scoped to a
/// single folder or item and end up in the listing or outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no Fetch TV server responded within {timeout_secs}s")]
    NotFound { timeout_secs: u64 },

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Body ended before the advertised length; the box does this routinely
    #[error("body of {url} ended early after {received} bytes")]
    IncompleteBody { url: String, received: u64 },

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid criteria: {reason}")]
    InvalidCriteria { reason: String },

    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl FetchError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        FetchError::Protocol {
            reason: reason.into(),
        }
    }

    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        FetchError::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FetchError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// True for errors that should abort the whole invocation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::NotFound { .. }
                | FetchError::InvalidCriteria { .. }
                | FetchError::Config { .. }
        )
    }
}

pub type Result<T, E = FetchError> = std::result::Result<T, E>;
