//! Catalog client seam
//!
//! Path resolution, library aggregation and login against the remote catalog
//! live outside this crate. [`StreamFiles`](crate::files::StreamFiles) only
//! needs the URLs to fetch for an already resolved track or album.

use url::Url;

use crate::error::Result;
use crate::id3::Id3v1Tag;

/// Resolves playable resources for catalog entries.
pub trait CatalogClient: Send + Sync {
    /// Stream URLs for a track, in playback order.
    ///
    /// One URL for a simple track. Multi-part tracks return several, each
    /// carrying a `range=<start>-<end>` query parameter.
    fn stream_urls(&self, track: &TrackRef) -> Result<Vec<Url>>;

    /// Cover art URL for an album, if it has one
    fn cover_url(&self, album: &AlbumRef) -> Result<Option<Url>>;
}

/// A resolved track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRef {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub comment: String,
    /// Size reported when exact sizes are not requested
    pub estimated_size: u64,
}

impl TrackRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Tag describing this track
    pub fn id3v1_tag(&self) -> Id3v1Tag {
        Id3v1Tag::new(
            self.title.clone(),
            self.artist.clone(),
            self.album.clone(),
            self.comment.clone(),
        )
    }
}

/// A resolved album
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumRef {
    pub id: String,
}

impl AlbumRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// What a filesystem `open` refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTarget {
    Track(TrackRef),
    Cover(AlbumRef),
}

impl OpenTarget {
    pub fn is_track(&self) -> bool {
        matches!(self, Self::Track(_))
    }
}
