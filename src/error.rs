//! Error taxonomy for the monitor.
//!
//! Library code returns [`MonitorError`]; the binary wraps it with `anyhow`
//! context at the edge.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// No usable targets, unreadable config file, or an invalid setting. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or HTTP failure for one target. The target is skipped.
    #[error("fetch failed for {target}: {message}")]
    Fetch { target: String, message: String },

    /// Snapshot or raw content could not be read/written for one target.
    #[error("storage error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Every notification channel failed (or none was configured).
    #[error("notification failed: {0}")]
    Notification(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn fetch(target: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Fetch {
            target: target.into(),
            message: msg.to_string(),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }
}
