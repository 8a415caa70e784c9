//! Network access for stream and segment URLs
//!
//! [`SegmentFetcher`] is the seam between file handles and the network. The
//! production implementation, [`HttpFetcher`], uses a blocking reqwest client
//! because every consumer runs on its own thread: filesystem request threads
//! for pass-through reads, a dedicated thread per segmented download.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_LENGTH;
use std::io::Read;
use tracing::debug;
use url::Url;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};

/// Body of one network response, read sequentially
pub type SegmentStream = Box<dyn Read + Send>;

/// Opens network resources for reading.
pub trait SegmentFetcher: Send + Sync + 'static {
    /// Start a GET request and return its body stream
    fn open(&self, url: &Url) -> Result<SegmentStream> {
        self.open_with_length(url).map(|(stream, _)| stream)
    }

    /// Start a GET request, returning the body stream and the declared
    /// content length if the server sent one
    fn open_with_length(&self, url: &Url) -> Result<(SegmentStream, Option<u64>)>;

    /// Size of a resource from a HEAD request
    fn content_length(&self, url: &Url) -> Result<u64>;
}

/// Blocking HTTP implementation of [`SegmentFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &StreamConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

impl SegmentFetcher for HttpFetcher {
    fn open_with_length(&self, url: &Url) -> Result<(SegmentStream, Option<u64>)> {
        debug!(%url, "GET");
        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        let length = response.content_length();
        debug!(%url, %status, ?length, "response");
        Ok((Box::new(response), length))
    }

    fn content_length(&self, url: &Url) -> Result<u64> {
        debug!(%url, "HEAD");
        let response = self.client.head(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        // HEAD bodies are empty, so read the header rather than content_length()
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .ok_or_else(|| StreamError::not_found(format!("content length of {url}")))
    }
}

/// Read from `stream` until `buf` is full or the stream ends.
///
/// Returns the number of bytes read. Interrupted reads are retried. An error
/// after some bytes were read is dropped in favour of the partial result; a
/// broken stream reports it again on the next call.
pub(crate) fn read_full(stream: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(_) if filled > 0 => break,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
