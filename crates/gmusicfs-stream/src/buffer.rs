//! Blocking, ordered byte-stream buffer shared by one producer and one consumer.
//!
//! The producer appends with [`ByteStreamBuffer::write`] and signals the end of
//! the stream with [`ByteStreamBuffer::close`]. The consumer drains with
//! [`ByteStreamBuffer::read`], which blocks until the requested amount is
//! available or the stream has ended. Bytes come out exactly once, in the order
//! they were written.
//!
//! Storage is a list of chunks, each holding at most `chunk_capacity` bytes.
//! The capacity sets chunk granularity only: writes never block, so a stream
//! that is not consumed grows without bound.
//!
//! ```
//! use gmusicfs_stream::ByteStreamBuffer;
//!
//! let buffer = ByteStreamBuffer::new();
//! buffer.write(b"one");
//! buffer.write(b"two");
//! assert_eq!(&buffer.read(3)[..], b"one");
//! buffer.write(b"three");
//! assert_eq!(&buffer.read(3)[..], b"two");
//! assert_eq!(&buffer.read(5)[..], b"three");
//! buffer.write(b"four");
//! buffer.close();
//! assert_eq!(&buffer.read_to_end()[..], b"four");
//! assert!(buffer.read_to_end().is_empty());
//! ```
//!
//! Concurrent writers or concurrent readers are a usage error and are not
//! detected.

use bytes::{Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;

use crate::config::DEFAULT_CHUNK_CAPACITY;

struct State {
    /// Oldest first. Only the last chunk is ever appended to.
    chunks: VecDeque<BytesMut>,
    /// Offset of the next unread byte in the front chunk
    read_pos: usize,
    first_write_done: bool,
    eof: bool,
    abandoned: bool,
}

impl State {
    fn available(&self) -> usize {
        self.chunks.iter().map(BytesMut::len).sum::<usize>() - self.read_pos
    }

    /// A read may look at the chunks once the producer wrote or gave up.
    fn ready(&self) -> bool {
        self.first_write_done || self.finished()
    }

    fn finished(&self) -> bool {
        self.eof || self.abandoned
    }

    fn drain(&mut self, mut remaining: usize, out: &mut BytesMut) {
        while remaining > 0 {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let unread = &front[self.read_pos..];
            let take = unread.len().min(remaining);
            out.extend_from_slice(&unread[..take]);
            self.read_pos += take;
            remaining -= take;

            if self.read_pos == front.len() {
                self.chunks.pop_front();
                self.read_pos = 0;
            }
        }
    }
}

pub struct ByteStreamBuffer {
    state: Mutex<State>,
    /// Signalled on every write, close and abandon
    changed: Condvar,
    chunk_capacity: usize,
}

impl ByteStreamBuffer {
    /// Create a buffer with the default 4 MiB chunk capacity
    pub fn new() -> Self {
        Self::with_chunk_capacity(DEFAULT_CHUNK_CAPACITY)
    }

    /// Create a buffer whose chunks hold at most `chunk_capacity` bytes.
    ///
    /// A capacity of zero is treated as one byte.
    pub fn with_chunk_capacity(chunk_capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                chunks: VecDeque::new(),
                read_pos: 0,
                first_write_done: false,
                eof: false,
                abandoned: false,
            }),
            changed: Condvar::new(),
            chunk_capacity: chunk_capacity.max(1),
        }
    }

    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Append `data` to the stream.
    ///
    /// Never fails and never waits for the consumer. After
    /// [`abandon`](Self::abandon) the data is discarded.
    pub fn write(&self, data: &[u8]) {
        let mut state = self.state.lock();
        if state.abandoned {
            return;
        }

        let cap = self.chunk_capacity;
        let mut rest = data;
        while !rest.is_empty() {
            let needs_chunk = state.chunks.back().is_none_or(|chunk| chunk.len() >= cap);
            if needs_chunk {
                state
                    .chunks
                    .push_back(BytesMut::with_capacity(cap.min(rest.len())));
            }
            if let Some(chunk) = state.chunks.back_mut() {
                let take = (cap - chunk.len()).min(rest.len());
                chunk.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
            }
        }

        state.first_write_done = true;
        drop(state);
        self.changed.notify_all();
    }

    /// Read exactly `len` bytes, or fewer if the stream ends first.
    ///
    /// Blocks until the first write (or close) has happened, even for
    /// `len == 0`, then until `len` bytes are buffered or end-of-stream is
    /// signalled. Returns an empty result once the stream is closed and drained.
    pub fn read(&self, len: usize) -> Bytes {
        let mut state = self.state.lock();
        while !state.ready() {
            self.changed.wait(&mut state);
        }
        while !state.finished() && state.available() < len {
            self.changed.wait(&mut state);
        }

        let mut out = BytesMut::with_capacity(len.min(state.available()));
        state.drain(len, &mut out);
        out.freeze()
    }

    /// Read everything up to end-of-stream.
    ///
    /// Blocks until [`close`](Self::close) and returns all remaining bytes.
    pub fn read_to_end(&self) -> Bytes {
        let mut state = self.state.lock();
        while !state.finished() {
            self.changed.wait(&mut state);
        }

        let available = state.available();
        let mut out = BytesMut::with_capacity(available);
        state.drain(available, &mut out);
        out.freeze()
    }

    /// Signal end-of-stream. Buffered bytes remain readable.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.eof = true;
        drop(state);
        self.changed.notify_all();
    }

    /// Give up on the stream from the consumer side.
    ///
    /// Buffered chunks are dropped, later writes are discarded and reads
    /// return empty.
    pub fn abandon(&self) {
        let mut state = self.state.lock();
        state.abandoned = true;
        state.chunks.clear();
        state.read_pos = 0;
        drop(state);
        self.changed.notify_all();
    }

    /// Number of written but unread bytes (a snapshot)
    pub fn len(&self) -> usize {
        self.state.lock().available()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().eof
    }

    pub fn is_abandoned(&self) -> bool {
        self.state.lock().abandoned
    }

    /// Number of chunks currently held
    pub fn chunk_count(&self) -> usize {
        self.state.lock().chunks.len()
    }
}

impl Default for ByteStreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ByteStreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ByteStreamBuffer")
            .field("chunk_capacity", &self.chunk_capacity)
            .field("chunks", &state.chunks.len())
            .field("available", &state.available())
            .field("eof", &state.eof)
            .field("abandoned", &state.abandoned)
            .finish()
    }
}
