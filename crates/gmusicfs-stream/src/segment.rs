//! Segment descriptors for multi-part tracks
//!
//! A multi-part track arrives as several URLs, each carrying a
//! `range=<start>-<end>` query parameter that names the inclusive byte range
//! of the logical file it serves. Consecutive ranges may overlap but must not
//! leave gaps.

use std::fmt;
use std::ops::Range;
use url::Url;

use crate::error::{Result, StreamError};

/// Query parameter holding a segment's byte range
pub const RANGE_PARAM: &str = "range";

/// One fetchable resource covering `[start, end)` of the logical stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub url: Url,
    /// First logical byte (inclusive)
    pub start: u64,
    /// End of the logical range (exclusive)
    pub end: u64,
}

impl Segment {
    pub fn new(url: Url, start: u64, end: u64) -> Self {
        Self { url, start, end }
    }

    /// Build a segment from a URL carrying a `range=<start>-<end>` parameter.
    ///
    /// Both bounds on the wire are inclusive, so `range=0-999` is 1000 bytes.
    pub fn from_url(url: Url) -> Result<Self> {
        let value = url
            .query_pairs()
            .find(|(key, _)| key == RANGE_PARAM)
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| StreamError::MissingRange {
                url: url.to_string(),
            })?;

        let Some((start, end)) = parse_range(&value) else {
            return Err(StreamError::invalid_range(url.as_str(), value));
        };
        let Some(end) = end.checked_add(1) else {
            return Err(StreamError::invalid_range(url.as_str(), value));
        };

        Ok(Self { url, start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}) {}", self.start, self.end, self.url)
    }
}

/// Parse an inclusive `START-END` pair
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.trim().split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    (start <= end).then_some((start, end))
}

/// Ordered segments backing one logical track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedSource {
    segments: Vec<Segment>,
}

impl SegmentedSource {
    pub fn new(segments: Vec<Segment>) -> Result<Self> {
        if segments.is_empty() {
            return Err(StreamError::NoStreamUrls);
        }
        Ok(Self { segments })
    }

    /// Parse each URL's range parameter, keeping catalog order
    pub fn from_urls<I>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = Url>,
    {
        let segments = urls
            .into_iter()
            .map(Segment::from_url)
            .collect::<Result<Vec<_>>>()?;
        Self::new(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Length of the logical stream, the end of the last segment
    pub fn total_len(&self) -> u64 {
        self.segments.last().map_or(0, |segment| segment.end)
    }

    /// Bytes that will be fetched twice because consecutive ranges overlap
    pub fn overlap_bytes(&self) -> u64 {
        self.segments
            .windows(2)
            .map(|pair| pair[0].end.saturating_sub(pair[1].start))
            .sum()
    }

    /// Check that the declared ranges cover `[0, total_len)` without gaps.
    pub fn validate_tiling(&self) -> Result<()> {
        let mut covered = 0u64;
        for (index, segment) in self.segments.iter().enumerate() {
            if segment.start > covered {
                return Err(StreamError::SegmentGap {
                    index,
                    produced: covered,
                    start: segment.start,
                });
            }
            covered = covered.max(segment.end);
        }
        Ok(())
    }
}
