//! Error types for the core library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An account definition is unusable (missing or empty `login`, wrong
    /// field types).
    #[error("Configuration error: {0}")]
    Config(String),

    /// No account is registered under the requested name.
    #[error("smtp account \"{0}\" unknown")]
    UnknownAccount(String),

    /// A configuration file is not valid JSON.
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration file or directory could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A transport failure outside the routinely handled kinds.
    #[error("SMTP error: {0}")]
    Smtp(#[from] mailrelay_smtp::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
