//! Streaming file handles for a music-library filesystem.
//!
//! Tracks are exposed as files that can be read while they download. Most
//! tracks come from a single HTTP response that is forwarded directly to the
//! filesystem's read calls. Multi-part tracks arrive as several overlapping
//! byte-range segments; these are stitched into one stream by a background
//! thread and consumed through a blocking buffer.
//!
//! # Architecture
//!
//! - `buffer`: one-producer, one-consumer blocking byte stream
//! - `segment`: segment URLs and their declared byte ranges
//! - `fetch`: the network seam and its blocking HTTP implementation
//! - `download`: the task that stitches segments into a buffer
//! - `handle`: pass-through and buffered file handles
//! - `files`: the open-handle table used by the filesystem adapter
//! - `catalog`: the seam to the remote music catalog
//! - `id3`: the legacy tag record appended to single-stream tracks
//! - `config`, `credentials`, `error`: configuration and error types
//!
//! # Example
//!
//! ```no_run
//! use gmusicfs_stream::{
//!     AlbumRef, CatalogClient, HttpFetcher, OpenTarget, StreamConfig, StreamFiles, TrackRef,
//! };
//! use std::sync::Arc;
//! use url::Url;
//!
//! struct OneTrack(Vec<Url>);
//!
//! impl CatalogClient for OneTrack {
//!     fn stream_urls(&self, _track: &TrackRef) -> gmusicfs_stream::Result<Vec<Url>> {
//!         Ok(self.0.clone())
//!     }
//!
//!     fn cover_url(&self, _album: &AlbumRef) -> gmusicfs_stream::Result<Option<Url>> {
//!         Ok(None)
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = StreamConfig::from_env()?;
//!     let fetcher = Arc::new(HttpFetcher::new(&config)?);
//!     let catalog = OneTrack(vec![Url::parse("https://stream.example.com/track.mp3")?]);
//!     let files = StreamFiles::new(catalog, fetcher, config);
//!
//!     let fh = files.open(&OpenTarget::Track(TrackRef::new("track")))?;
//!     let first = files.read(fh, 0, 64 * 1024)?;
//!     println!("{} bytes", first.len());
//!     files.release(fh);
//!     Ok(())
//! }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod buffer;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod download;
pub mod error;
pub mod fetch;
pub mod files;
pub mod handle;
pub mod id3;
pub mod segment;

pub use buffer::ByteStreamBuffer;
pub use catalog::{AlbumRef, CatalogClient, OpenTarget, TrackRef};
pub use config::StreamConfig;
pub use credentials::{Credentials, Session};
pub use download::{DownloadHandle, DownloadSummary, SegmentedDownloadTask};
pub use error::{ConfigError, Result, StreamError};
pub use fetch::{HttpFetcher, SegmentFetcher, SegmentStream};
pub use files::StreamFiles;
pub use handle::{BufferedHandle, PassThroughHandle, VirtualFileHandle};
pub use id3::Id3v1Tag;
pub use segment::{Segment, SegmentedSource};
