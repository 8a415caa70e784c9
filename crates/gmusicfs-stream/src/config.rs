//! Configuration for streamed file handles

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Default chunk granularity of a [`ByteStreamBuffer`](crate::buffer::ByteStreamBuffer)
pub const DEFAULT_CHUNK_CAPACITY: usize = 4 * 1024 * 1024;

/// Default slice size read from each segment stream
pub const DEFAULT_READ_SLICE: usize = 32 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Capacity ceiling of one buffer chunk. Controls granularity only, the
    /// buffer applies no backpressure.
    pub chunk_capacity: usize,

    /// Bytes read from a segment stream per buffer write
    pub read_slice: usize,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Whole-request timeout, `None` for long-lived streams
    pub request_timeout: Option<Duration>,

    /// User agent sent with every request
    pub user_agent: String,

    /// Report exact file sizes (one HEAD request per file)
    pub true_file_size: bool,

    /// Append a synthesized ID3v1 record to single-stream tracks
    pub id3v1_trailer: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            read_slice: DEFAULT_READ_SLICE,
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            user_agent: concat!("gmusicfs-stream/", env!("CARGO_PKG_VERSION")).to_string(),
            true_file_size: false,
            id3v1_trailer: true,
        }
    }
}

impl StreamConfig {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            chunk_capacity: env_parse("GMUSICFS_CHUNK_CAPACITY").unwrap_or(defaults.chunk_capacity),
            read_slice: env_parse("GMUSICFS_READ_SLICE").unwrap_or(defaults.read_slice),
            connect_timeout: env_parse("GMUSICFS_CONNECT_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            request_timeout: match env_parse::<u64>("GMUSICFS_REQUEST_TIMEOUT") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.request_timeout,
            },
            user_agent: std::env::var("GMUSICFS_USER_AGENT").unwrap_or(defaults.user_agent),
            true_file_size: env_parse("GMUSICFS_TRUE_FILE_SIZE").unwrap_or(defaults.true_file_size),
            id3v1_trailer: env_parse("GMUSICFS_ID3V1_TRAILER").unwrap_or(defaults.id3v1_trailer),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunk_capacity",
                reason: "must be at least 1 byte".to_string(),
            });
        }
        if self.read_slice == 0 {
            return Err(ConfigError::InvalidValue {
                field: "read_slice",
                reason: "must be at least 1 byte".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn with_chunk_capacity(mut self, chunk_capacity: usize) -> Self {
        self.chunk_capacity = chunk_capacity;
        self
    }

    #[must_use]
    pub fn with_read_slice(mut self, read_slice: usize) -> Self {
        self.read_slice = read_slice;
        self
    }

    #[must_use]
    pub fn with_true_file_size(mut self, enabled: bool) -> Self {
        self.true_file_size = enabled;
        self
    }

    #[must_use]
    pub fn with_id3v1_trailer(mut self, enabled: bool) -> Self {
        self.id3v1_trailer = enabled;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
