//! Open-handle table behind the filesystem's `open`, `read`, `release` and
//! `getattr` callbacks

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use url::Url;

use crate::buffer::ByteStreamBuffer;
use crate::catalog::{AlbumRef, CatalogClient, OpenTarget, TrackRef};
use crate::config::StreamConfig;
use crate::download::SegmentedDownloadTask;
use crate::error::{Result, StreamError};
use crate::fetch::SegmentFetcher;
use crate::handle::{BufferedHandle, PassThroughHandle, VirtualFileHandle};
use crate::id3::{ID3V1_TRAILER_SIZE, Id3v1Tag};
use crate::segment::SegmentedSource;

/// Size reported for cover art when exact sizes are not requested
pub const COVER_SIZE_PLACEHOLDER: u64 = 10_000_000;

type SharedHandle = Arc<Mutex<VirtualFileHandle>>;

/// Streamed files keyed by filesystem handle number.
///
/// The table lock is held only to insert, look up or remove an entry. Reads
/// block on the handle's own lock, so a slow stream never stalls `open` or
/// `release` of other files.
pub struct StreamFiles<C, F> {
    catalog: C,
    fetcher: Arc<F>,
    config: StreamConfig,
    handles: Mutex<HashMap<u64, SharedHandle>>,
    next_handle: AtomicU64,
}

impl<C: CatalogClient, F: SegmentFetcher> StreamFiles<C, F> {
    pub fn new(catalog: C, fetcher: Arc<F>, config: StreamConfig) -> Self {
        Self {
            catalog,
            fetcher,
            config,
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Open a track or cover and return its handle number.
    ///
    /// A single URL is read straight from the response. Several URLs start a
    /// background download and return before any data arrives.
    pub fn open(&self, target: &OpenTarget) -> Result<u64> {
        let handle = match target {
            OpenTarget::Track(track) => self.open_track(track)?,
            OpenTarget::Cover(album) => self.open_cover(album)?,
        };

        let fh = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let buffered = handle.is_buffered();
        self.handles.lock().insert(fh, Arc::new(Mutex::new(handle)));
        debug!(fh, buffered, "opened");
        Ok(fh)
    }

    fn open_track(&self, track: &TrackRef) -> Result<VirtualFileHandle> {
        let urls = self.catalog.stream_urls(track)?;
        match <[Url; 1]>::try_from(urls) {
            Ok([url]) => {
                let tag = self.config.id3v1_trailer.then(|| track.id3v1_tag());
                self.open_pass_through(&url, tag)
            }
            Err(urls) if urls.is_empty() => Err(StreamError::NoStreamUrls),
            Err(urls) => {
                info!(track = %track.id, parts = urls.len(), "opening multi-part track");
                self.open_buffered(urls)
            }
        }
    }

    fn open_cover(&self, album: &AlbumRef) -> Result<VirtualFileHandle> {
        let url = self
            .catalog
            .cover_url(album)?
            .ok_or(StreamError::NoCoverArt)?;
        self.open_pass_through(&url, None)
    }

    fn open_pass_through(
        &self,
        url: &Url,
        tag: Option<Id3v1Tag>,
    ) -> Result<VirtualFileHandle> {
        let (stream, length) = self.fetcher.open_with_length(url)?;
        Ok(VirtualFileHandle::PassThrough(PassThroughHandle::new(
            stream, length, tag,
        )))
    }

    fn open_buffered(&self, urls: Vec<Url>) -> Result<VirtualFileHandle> {
        let source = SegmentedSource::from_urls(urls)?;
        if let Err(e) = source.validate_tiling() {
            // The download stops at the gap; the file reads short
            debug!("declared segment ranges do not tile: {e}");
        }

        let buffer = Arc::new(ByteStreamBuffer::with_chunk_capacity(
            self.config.chunk_capacity,
        ));
        let download =
            SegmentedDownloadTask::new(source, Arc::clone(&self.fetcher), Arc::clone(&buffer))
                .with_read_slice(self.config.read_slice)
                .spawn()?;
        Ok(VirtualFileHandle::Buffered(BufferedHandle::new(
            buffer, download,
        )))
    }

    /// Read up to `size` bytes from an open handle.
    ///
    /// Reads are sequential; `offset` is not used to seek.
    pub fn read(&self, fh: u64, offset: u64, size: usize) -> Result<Bytes> {
        let handle = self
            .handles
            .lock()
            .get(&fh)
            .cloned()
            .ok_or(StreamError::UnknownHandle(fh))?;
        let mut handle = handle.lock();
        handle.read(offset, size)
    }

    /// Close a handle. Unknown handles are ignored.
    pub fn release(&self, fh: u64) {
        let removed = self.handles.lock().remove(&fh);
        match removed {
            Some(handle) => {
                handle.lock().release();
                debug!(fh, "released");
            }
            None => debug!(fh, "release of unknown handle ignored"),
        }
    }

    /// Size to report for a file before it is opened.
    ///
    /// With exact sizes enabled a single-stream track is its content length
    /// plus the trailer, a multi-part track the end of its last declared
    /// range. Otherwise the catalog estimate is used.
    pub fn reported_size(&self, target: &OpenTarget) -> Result<u64> {
        match target {
            OpenTarget::Track(track) if self.config.true_file_size => {
                let urls = self.catalog.stream_urls(track)?;
                match <[Url; 1]>::try_from(urls) {
                    Ok([url]) => {
                        let length = self.fetcher.content_length(&url)?;
                        let trailer = if self.config.id3v1_trailer {
                            ID3V1_TRAILER_SIZE as u64
                        } else {
                            0
                        };
                        Ok(length + trailer)
                    }
                    Err(urls) => Ok(SegmentedSource::from_urls(urls)?.total_len()),
                }
            }
            OpenTarget::Track(track) => Ok(track.estimated_size),
            OpenTarget::Cover(album) if self.config.true_file_size => {
                let url = self
                    .catalog
                    .cover_url(album)?
                    .ok_or(StreamError::NoCoverArt)?;
                self.fetcher.content_length(&url)
            }
            OpenTarget::Cover(_) => Ok(COVER_SIZE_PLACEHOLDER),
        }
    }

    /// Number of open handles
    pub fn open_count(&self) -> usize {
        self.handles.lock().len()
    }
}

impl<C, F> Drop for StreamFiles<C, F> {
    fn drop(&mut self) {
        let handles = std::mem::take(self.handles.get_mut());
        if !handles.is_empty() {
            debug!(open = handles.len(), "releasing handles left open");
        }
        for handle in handles.into_values() {
            handle.lock().release();
        }
    }
}
