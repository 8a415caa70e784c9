//! Background download that stitches overlapping segments into one stream
//!
//! [`SegmentedDownloadTask`] walks a [`SegmentedSource`] in order, drops the
//! leading bytes of each segment that were already produced by its
//! predecessor, and writes the rest into a [`ByteStreamBuffer`]. The buffer is
//! closed exactly once when the task ends, whatever the outcome, so a reader
//! blocked on it is always released. Failures end the stream early; the
//! reader sees a short file, never an error.

use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::buffer::ByteStreamBuffer;
use crate::config::DEFAULT_READ_SLICE;
use crate::error::{Result, StreamError};
use crate::fetch::SegmentFetcher;
use crate::segment::SegmentedSource;

/// Outcome of a completed download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadSummary {
    /// Segments fetched
    pub segments: usize,
    /// Logical bytes written to the buffer
    pub bytes_written: u64,
    /// Overlapping bytes read and discarded
    pub bytes_skipped: u64,
}

/// Closes the buffer when dropped, including on unwind
struct CloseOnDrop<'a>(&'a ByteStreamBuffer);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

pub struct SegmentedDownloadTask<F: SegmentFetcher> {
    source: SegmentedSource,
    fetcher: Arc<F>,
    buffer: Arc<ByteStreamBuffer>,
    read_slice: usize,
}

impl<F: SegmentFetcher> SegmentedDownloadTask<F> {
    pub fn new(source: SegmentedSource, fetcher: Arc<F>, buffer: Arc<ByteStreamBuffer>) -> Self {
        Self {
            source,
            fetcher,
            buffer,
            read_slice: DEFAULT_READ_SLICE,
        }
    }

    /// Bytes read from a segment per buffer write
    #[must_use]
    pub fn with_read_slice(mut self, read_slice: usize) -> Self {
        self.read_slice = read_slice.max(1);
        self
    }

    pub fn buffer(&self) -> &Arc<ByteStreamBuffer> {
        &self.buffer
    }

    /// Run the download on the current thread.
    ///
    /// The buffer is closed on return. The error, if any, is for logging
    /// and lifecycle only; the consumer just sees the stream end.
    pub fn run(self) -> Result<DownloadSummary> {
        let _close = CloseOnDrop(&self.buffer);

        info!(
            segments = self.source.len(),
            total = self.source.total_len(),
            "starting segmented download"
        );
        let result = self.pump();
        match &result {
            Ok(summary) => info!(
                segments = summary.segments,
                written = summary.bytes_written,
                skipped = summary.bytes_skipped,
                "segmented download finished"
            ),
            Err(e @ StreamError::SegmentGap { .. }) => {
                error!("segmented download aborted, ranges do not tile: {e}");
            }
            Err(e) => warn!("segmented download failed, stream truncated: {e}"),
        }
        result
    }

    fn pump(&self) -> Result<DownloadSummary> {
        let mut summary = DownloadSummary::default();
        let mut slice = vec![0u8; self.read_slice];

        for (index, segment) in self.source.segments().iter().enumerate() {
            let produced = summary.bytes_written;
            if segment.start > produced {
                return Err(StreamError::SegmentGap {
                    index,
                    produced,
                    start: segment.start,
                });
            }
            let skip = produced - segment.start;

            debug!(index, %segment, skip, "fetching segment");
            let mut stream = self.fetcher.open(&segment.url)?;
            summary.segments += 1;

            let skipped = io::copy(&mut (&mut stream).take(skip), &mut io::sink())?;
            summary.bytes_skipped += skipped;

            let mut forwarded = 0u64;
            loop {
                let n = match stream.read(&mut slice) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                self.buffer.write(&slice[..n]);
                forwarded += n as u64;
                summary.bytes_written += n as u64;
            }

            let delivered = skipped + forwarded;
            if delivered != segment.len() {
                debug!(
                    index,
                    declared = segment.len(),
                    delivered,
                    "segment length differs from its declared range"
                );
            }
        }

        Ok(summary)
    }

    /// Run the download on a dedicated thread.
    ///
    /// Returns immediately. If the thread cannot be started the buffer is
    /// closed before the error is returned.
    pub fn spawn(self) -> Result<DownloadHandle> {
        let buffer = Arc::clone(&self.buffer);
        thread::Builder::new()
            .name("segmented-download".to_string())
            .spawn(move || self.run())
            .map(|thread| DownloadHandle { thread })
            .map_err(|e| {
                buffer.close();
                StreamError::ThreadSpawn(e)
            })
    }
}

/// Handle to a download running on its own thread.
///
/// Dropping the handle detaches the thread; it keeps running to completion.
#[derive(Debug)]
pub struct DownloadHandle {
    thread: JoinHandle<Result<DownloadSummary>>,
}

impl DownloadHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the download to end and return its outcome
    pub fn join(self) -> Result<DownloadSummary> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("download thread panicked").into()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Cursor;
    use url::Url;

    /// Serves fixed bodies by URL; `fail_after` makes a body error mid-stream
    #[derive(Default)]
    struct FakeFetcher {
        bodies: HashMap<String, Vec<u8>>,
        fail_after: HashMap<String, usize>,
        opened: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn with(mut self, url: &Url, body: Vec<u8>) -> Self {
            self.bodies.insert(url.to_string(), body);
            self
        }

        fn failing(mut self, url: &Url, body: Vec<u8>, after: usize) -> Self {
            self.fail_after.insert(url.to_string(), after);
            self.with(url, body)
        }
    }

    struct FailingReader {
        inner: Cursor<Vec<u8>>,
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let n = buf.len().min(self.remaining);
            let n = self.inner.read(&mut buf[..n])?;
            self.remaining -= n;
            Ok(n)
        }
    }

    impl SegmentFetcher for FakeFetcher {
        fn open_with_length(&self, url: &Url) -> Result<(crate::SegmentStream, Option<u64>)> {
            self.opened.lock().push(url.to_string());
            let body = self
                .bodies
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| StreamError::not_found(url.to_string()))?;
            let len = body.len() as u64;
            let stream: crate::SegmentStream = match self.fail_after.get(url.as_str()) {
                Some(&after) => Box::new(FailingReader {
                    inner: Cursor::new(body),
                    remaining: after,
                }),
                None => Box::new(Cursor::new(body)),
            };
            Ok((stream, Some(len)))
        }

        fn content_length(&self, url: &Url) -> Result<u64> {
            self.bodies
                .get(url.as_str())
                .map(|b| b.len() as u64)
                .ok_or_else(|| StreamError::not_found(url.to_string()))
        }
    }

    fn part(name: &str, start: u64, end_inclusive: u64) -> Url {
        Url::parse(&format!(
            "http://cdn.test/{name}?range={start}-{end_inclusive}"
        ))
        .unwrap()
    }

    fn logical(range: std::ops::Range<u32>) -> Vec<u8> {
        range.map(|i| (i % 253) as u8).collect()
    }

    #[test]
    fn test_overlap_is_skipped() {
        let a = part("a", 0, 999);
        let b = part("b", 900, 1999);
        let body_a = logical(0..1000);
        let body_b = logical(900..2000);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with(&a, body_a.clone())
                .with(&b, body_b.clone()),
        );

        let buffer = Arc::new(ByteStreamBuffer::with_chunk_capacity(256));
        let source = SegmentedSource::from_urls([a, b]).unwrap();
        let summary = SegmentedDownloadTask::new(source, fetcher, Arc::clone(&buffer))
            .with_read_slice(64)
            .run()
            .unwrap();

        assert_eq!(
            summary,
            DownloadSummary {
                segments: 2,
                bytes_written: 2000,
                bytes_skipped: 100,
            }
        );
        assert!(buffer.is_closed());

        let mut expected = body_a;
        expected.extend_from_slice(&body_b[100..]);
        assert_eq!(buffer.read_to_end().to_vec(), expected);
        assert_eq!(expected, logical(0..2000));
    }

    #[test]
    fn test_gap_closes_buffer_without_further_writes() {
        let a = part("a", 0, 99);
        let b = part("b", 150, 199);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with(&a, logical(0..100))
                .with(&b, logical(150..200)),
        );

        let buffer = Arc::new(ByteStreamBuffer::new());
        let source = SegmentedSource::new(vec![
            Segment::from_url(a).unwrap(),
            Segment::from_url(b.clone()).unwrap(),
        ])
        .unwrap();
        let err = SegmentedDownloadTask::new(source, Arc::clone(&fetcher), Arc::clone(&buffer))
            .run()
            .unwrap_err();

        assert!(matches!(
            err,
            StreamError::SegmentGap {
                index: 1,
                produced: 100,
                start: 150
            }
        ));
        assert!(buffer.is_closed());
        assert_eq!(buffer.read_to_end().to_vec(), logical(0..100));
        assert!(!fetcher.opened.lock().contains(&b.to_string()));
    }

    #[test]
    fn test_failure_mid_segment_truncates_stream() {
        let a = part("a", 0, 999);
        let b = part("b", 900, 1999);
        let c = part("c", 1900, 2999);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with(&a, logical(0..1000))
                .failing(&b, logical(900..2000), 400)
                .with(&c, logical(1900..3000)),
        );

        let buffer = Arc::new(ByteStreamBuffer::new());
        let source = SegmentedSource::from_urls([a, b, c.clone()]).unwrap();
        let task = SegmentedDownloadTask::new(source, Arc::clone(&fetcher), Arc::clone(&buffer))
            .with_read_slice(128);
        let handle = task.spawn().unwrap();

        // 1000 from A, then B's first 400 bytes of which 100 overlap
        let data = buffer.read(10_000);
        assert_eq!(data.to_vec(), logical(0..1300));
        assert!(buffer.read(10_000).is_empty());

        let err = handle.join().unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
        assert!(!fetcher.opened.lock().contains(&c.to_string()));
    }

    #[test]
    fn test_open_failure_releases_reader() {
        let a = part("a", 0, 9);
        let missing = part("missing", 5, 19);
        let fetcher = Arc::new(FakeFetcher::default().with(&a, logical(0..10)));

        let buffer = Arc::new(ByteStreamBuffer::new());
        let source = SegmentedSource::from_urls([a, missing]).unwrap();
        let handle = SegmentedDownloadTask::new(source, fetcher, Arc::clone(&buffer))
            .spawn()
            .unwrap();

        assert_eq!(buffer.read(100).to_vec(), logical(0..10));
        assert!(buffer.read(100).is_empty());
        assert!(matches!(
            handle.join(),
            Err(StreamError::NotFound { .. })
        ));
    }

    #[test]
    fn test_short_segment_shifts_next_skip() {
        // A declares 0-999 but only delivers 950 bytes
        let a = part("a", 0, 999);
        let b = part("b", 900, 1999);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with(&a, logical(0..950))
                .with(&b, logical(900..2000)),
        );

        let buffer = Arc::new(ByteStreamBuffer::new());
        let source = SegmentedSource::from_urls([a, b]).unwrap();
        let summary = SegmentedDownloadTask::new(source, fetcher, Arc::clone(&buffer))
            .run()
            .unwrap();

        assert_eq!(summary.bytes_skipped, 50);
        assert_eq!(buffer.read_to_end().to_vec(), logical(0..2000));
    }

    #[test]
    fn test_segment_shorter_than_overlap_contributes_nothing() {
        let a = part("a", 0, 999);
        let b = part("b", 100, 199);
        let c = part("c", 1000, 1099);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with(&a, logical(0..1000))
                .with(&b, logical(100..200))
                .with(&c, logical(1000..1100)),
        );

        let buffer = Arc::new(ByteStreamBuffer::new());
        let source = SegmentedSource::from_urls([a, b, c]).unwrap();
        let summary = SegmentedDownloadTask::new(source, fetcher, Arc::clone(&buffer))
            .run()
            .unwrap();

        assert_eq!(summary.bytes_written, 1100);
        assert_eq!(summary.bytes_skipped, 100);
        assert_eq!(buffer.read_to_end().to_vec(), logical(0..1100));
    }

    #[test]
    fn test_reader_consumes_while_downloading() {
        let urls: Vec<Url> = (0..8u64)
            .map(|i| part(&format!("p{i}"), i * 1000, i * 1000 + 1099))
            .collect();
        let mut fetcher = FakeFetcher::default();
        for (i, url) in urls.iter().enumerate() {
            let start = i as u32 * 1000;
            fetcher = fetcher.with(url, logical(start..start + 1100));
        }

        let buffer = Arc::new(ByteStreamBuffer::with_chunk_capacity(333));
        let source = SegmentedSource::from_urls(urls).unwrap();
        let handle = SegmentedDownloadTask::new(source, Arc::new(fetcher), Arc::clone(&buffer))
            .with_read_slice(97)
            .spawn()
            .unwrap();

        let mut received = Vec::new();
        loop {
            let data = buffer.read(501);
            if data.is_empty() {
                break;
            }
            received.extend_from_slice(&data);
        }

        let summary = handle.join().unwrap();
        assert_eq!(summary.bytes_written, 8100);
        assert_eq!(received, logical(0..8100));
    }
}
