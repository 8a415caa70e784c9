//! Open file handles
//!
//! A [`VirtualFileHandle`] hides whether a file is read straight off one
//! network response or out of a [`ByteStreamBuffer`] fed by a background
//! download. Both variants read sequentially from an implicit cursor: the
//! offset passed by the filesystem layer is never used to seek, and callers
//! must issue contiguous, increasing reads.

use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::buffer::ByteStreamBuffer;
use crate::download::DownloadHandle;
use crate::error::Result;
use crate::fetch::{SegmentStream, read_full};
use crate::id3::{ID3V1_TRAILER_SIZE, Id3v1Tag};

#[derive(Debug)]
pub enum VirtualFileHandle {
    /// One network response forwarded directly
    PassThrough(PassThroughHandle),
    /// Stitched segments delivered through a stream buffer
    Buffered(BufferedHandle),
}

impl VirtualFileHandle {
    /// Read up to `size` bytes from the current position.
    ///
    /// `offset` is not used to seek. A read that does not start at the
    /// current position is served from the current position anyway.
    pub fn read(&mut self, offset: u64, size: usize) -> Result<Bytes> {
        let position = self.position();
        if offset != position {
            debug!(offset, position, "non-sequential read, offset ignored");
        }
        match self {
            Self::PassThrough(handle) => handle.read(size),
            Self::Buffered(handle) => Ok(handle.read(size)),
        }
    }

    /// Bytes returned so far
    pub fn position(&self) -> u64 {
        match self {
            Self::PassThrough(handle) => handle.position,
            Self::Buffered(handle) => handle.position,
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }

    /// Let go of the network resources. Later reads return empty.
    pub fn release(&mut self) {
        match self {
            Self::PassThrough(handle) => handle.release(),
            Self::Buffered(handle) => handle.release(),
        }
    }
}

/// One response body followed, for tagged tracks, by the ID3v1 record.
///
/// The file is the network bytes then the 128-byte record, so a read window
/// that straddles the end of the body gets the rest of the body and the
/// leading part of the record, and the next read continues the record.
pub struct PassThroughHandle {
    stream: SegmentStream,
    content_length: Option<u64>,
    tag: Option<Id3v1Tag>,
    network_read: u64,
    network_done: bool,
    trailer_sent: usize,
    released: bool,
    position: u64,
}

impl PassThroughHandle {
    /// Wrap a response body. A tag is only appended when `content_length`
    /// is known.
    pub fn new(stream: SegmentStream, content_length: Option<u64>, tag: Option<Id3v1Tag>) -> Self {
        Self {
            stream,
            content_length,
            tag,
            network_read: 0,
            network_done: false,
            trailer_sent: 0,
            released: false,
            position: 0,
        }
    }

    /// Record to append after the body, if any
    fn trailer(&self) -> Option<[u8; ID3V1_TRAILER_SIZE]> {
        self.content_length?;
        self.tag.as_ref().map(Id3v1Tag::to_bytes)
    }

    /// Network bytes a read of `size` may take before the trailer starts
    fn network_window(&self, size: usize) -> usize {
        match (&self.tag, self.content_length) {
            (Some(_), Some(length)) => {
                let remaining = length.saturating_sub(self.network_read);
                usize::try_from(remaining).map_or(size, |remaining| remaining.min(size))
            }
            _ => size,
        }
    }

    fn read(&mut self, size: usize) -> Result<Bytes> {
        if self.released {
            return Ok(Bytes::new());
        }

        let mut buf = BytesMut::with_capacity(size);
        if !self.network_done {
            let want = self.network_window(size);
            buf.resize(want, 0);
            let n = read_full(&mut *self.stream, &mut buf)?;
            buf.truncate(n);
            self.network_read += n as u64;

            let body_complete = self.tag.is_some()
                && self
                    .content_length
                    .is_some_and(|length| self.network_read >= length);
            if n < want || body_complete {
                self.network_done = true;
            }
        }

        if self.network_done
            && let Some(record) = self.trailer()
        {
            let room = size - buf.len();
            let end = (self.trailer_sent + room).min(ID3V1_TRAILER_SIZE);
            if end > self.trailer_sent {
                trace!(
                    network = self.network_read,
                    from = self.trailer_sent,
                    to = end,
                    "appending ID3v1 trailer"
                );
                buf.extend_from_slice(&record[self.trailer_sent..end]);
                self.trailer_sent = end;
            }
        }

        self.position += buf.len() as u64;
        Ok(buf.freeze())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stream = Box::new(std::io::empty());
            debug!(position = self.position, "released pass-through handle");
        }
    }
}

impl fmt::Debug for PassThroughHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassThroughHandle")
            .field("content_length", &self.content_length)
            .field("tag", &self.tag)
            .field("network_read", &self.network_read)
            .field("trailer_sent", &self.trailer_sent)
            .field("released", &self.released)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct BufferedHandle {
    buffer: Arc<ByteStreamBuffer>,
    download: DownloadHandle,
    position: u64,
}

impl BufferedHandle {
    pub fn new(buffer: Arc<ByteStreamBuffer>, download: DownloadHandle) -> Self {
        Self {
            buffer,
            download,
            position: 0,
        }
    }

    pub fn buffer(&self) -> &Arc<ByteStreamBuffer> {
        &self.buffer
    }

    fn read(&mut self, size: usize) -> Bytes {
        let data = self.buffer.read(size);
        self.position += data.len() as u64;
        data
    }

    /// Stop consuming. The download keeps running; its writes are discarded.
    fn release(&mut self) {
        if self.buffer.is_abandoned() {
            return;
        }
        self.buffer.abandon();
        debug!(
            position = self.position,
            download_finished = self.download.is_finished(),
            "released buffered handle"
        );
    }
}
