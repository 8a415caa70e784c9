//! Error types for streaming file handles.
//!
//! Data-path failures inside a segmented download never travel through the
//! [`ByteStreamBuffer`](crate::buffer::ByteStreamBuffer); they end the stream
//! early instead. The types here cover everything that is reported to a caller.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening, reading or releasing streamed files.
#[derive(Debug, Error)]
pub enum StreamError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP status {status} for {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Status returned by the server
        status: reqwest::StatusCode,
    },

    /// I/O error while reading a network stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Segment URL carries no `range` query parameter
    #[error("Segment URL has no range parameter: {url}")]
    MissingRange {
        /// Offending URL
        url: String,
    },

    /// Segment URL carries a malformed `range` query parameter
    #[error("Invalid range '{value}' in segment URL {url}")]
    InvalidRange {
        /// Offending URL
        url: String,
        /// Raw parameter value
        value: String,
    },

    /// Segment starts after the bytes produced so far, leaving a hole
    #[error("Segment {index} starts at byte {start} but only {produced} bytes precede it")]
    SegmentGap {
        /// Position of the segment in its source
        index: usize,
        /// Logical bytes produced before the segment
        produced: u64,
        /// Declared start of the segment
        start: u64,
    },

    /// Catalog returned no stream URL for a track
    #[error("No stream URL available")]
    NoStreamUrls,

    /// Album has no cover image
    #[error("No cover art available")]
    NoCoverArt,

    /// Requested entity does not exist
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing entity
        what: String,
    },

    /// Read or release of a handle that is not open
    #[error("Unknown file handle: {0}")]
    UnknownHandle(u64),

    /// Background download thread could not be started
    #[error("Failed to spawn download thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

impl StreamError {
    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create an invalid range error
    pub fn invalid_range(url: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidRange {
            url: url.into(),
            value: value.into(),
        }
    }

    /// POSIX errno the filesystem layer should report for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound { .. } | Self::NoCoverArt | Self::NoStreamUrls => libc::ENOENT,
            Self::UnknownHandle(_) => libc::EBADF,
            _ => libc::EIO,
        }
    }
}

/// Errors raised while loading configuration or the credential store.
///
/// These are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Credential file does not exist
    #[error(
        "No credentials file found at {path}. Create it with a [credentials] table \
         holding username, password and device_id, then chmod 600 it"
    )]
    CredentialsNotFound {
        /// Expected location
        path: PathBuf,
    },

    /// Credential file is readable or writable by group/others
    #[error("Credentials file {path} is not protected (mode {mode:o}). Please run: chmod 600 {path}")]
    InsecurePermissions {
        /// File location
        path: PathBuf,
        /// Permission bits found
        mode: u32,
    },

    /// Required field is missing or empty
    #[error("No {field} could be read from {path}")]
    MissingField {
        /// File location
        path: PathBuf,
        /// Field name
        field: &'static str,
    },

    /// Credential file is not valid TOML
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File location
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: toml::de::Error,
    },

    /// Credential file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File location
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration value out of range
    #[error("Invalid {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, StreamError>;
