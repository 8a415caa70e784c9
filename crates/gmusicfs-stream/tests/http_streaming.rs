//! Streaming against a local HTTP server.
//!
//! The blocking client runs inside `spawn_blocking`, and is created and
//! dropped there, so it never touches the test runtime's worker threads.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gmusicfs_stream::{
    AlbumRef, CatalogClient, HttpFetcher, Id3v1Tag, OpenTarget, SegmentFetcher, StreamConfig,
    StreamError, StreamFiles, TrackRef,
};
use pretty_assertions::assert_eq;
use std::io::Read as _;
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn logical(range: std::ops::Range<u32>) -> Vec<u8> {
    range.map(|i| (i % 239) as u8).collect()
}

async fn blocking<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking test body panicked")
}

struct Catalog {
    urls: Vec<Url>,
}

impl CatalogClient for Catalog {
    fn stream_urls(&self, _track: &TrackRef) -> gmusicfs_stream::Result<Vec<Url>> {
        Ok(self.urls.clone())
    }

    fn cover_url(&self, _album: &AlbumRef) -> gmusicfs_stream::Result<Option<Url>> {
        Ok(self.urls.first().cloned())
    }
}

fn files(urls: Vec<Url>, config: StreamConfig) -> StreamFiles<Catalog, HttpFetcher> {
    let fetcher = Arc::new(HttpFetcher::new(&config).expect("Failed to build HTTP client"));
    StreamFiles::new(Catalog { urls }, fetcher, config)
}

fn read_all(files: &StreamFiles<Catalog, HttpFetcher>, fh: u64, size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let data = files.read(fh, out.len() as u64, size).unwrap();
        if data.is_empty() {
            return out;
        }
        out.extend_from_slice(&data);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetcher_get_and_head() {
    let server = MockServer::start().await;
    Mock::given(path("/track.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(logical(0..5000)))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/track.mp3", server.uri())).unwrap();
    let (body, length, head) = blocking(move || {
        let fetcher = HttpFetcher::new(&StreamConfig::default()).unwrap();
        let (mut stream, length) = fetcher.open_with_length(&url).unwrap();
        let mut body = Vec::new();
        stream.read_to_end(&mut body).unwrap();
        let head = fetcher.content_length(&url).unwrap();
        (body, length, head)
    })
    .await;

    assert_eq!(body, logical(0..5000));
    assert_eq!(length, Some(5000));
    assert_eq!(head, 5000);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetcher_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
    let err = blocking(move || {
        let fetcher = HttpFetcher::new(&StreamConfig::default()).unwrap();
        fetcher.open(&url).err()
    })
    .await;

    match err {
        Some(StreamError::HttpStatus { status, .. }) => assert_eq!(status.as_u16(), 404),
        other => unreachable!("expected status error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_stream_track_with_trailer() {
    let server = MockServer::start().await;
    Mock::given(path("/song"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(logical(0..3000)))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/song", server.uri())).unwrap();
    let (size, data) = blocking(move || {
        let files = files(vec![url], StreamConfig::default().with_true_file_size(true));
        let target = OpenTarget::Track(TrackRef {
            title: "Song".to_string(),
            artist: "Band".to_string(),
            ..TrackRef::new("song")
        });
        let size = files.reported_size(&target).unwrap();
        let fh = files.open(&target).unwrap();
        let data = read_all(&files, fh, 64 * 1024);
        files.release(fh);
        (size, data)
    })
    .await;

    assert_eq!(size, 3000 + 128);
    assert_eq!(data.len() as u64, size);
    assert_eq!(&data[..3000], &logical(0..3000)[..]);
    assert_eq!(
        &data[3000..],
        &Id3v1Tag::new("Song", "Band", "", "").to_bytes()[..]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multi_part_track_is_stitched() {
    let server = MockServer::start().await;
    let parts = [(0u32, 40_000u32), (39_000, 90_000), (90_000, 100_000)];
    for (i, (start, end)) in parts.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(format!("/part/{i}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(logical(*start..*end)))
            .mount(&server)
            .await;
    }

    let urls: Vec<Url> = parts
        .iter()
        .enumerate()
        .map(|(i, (start, end))| {
            Url::parse(&format!(
                "{}/part/{i}?range={start}-{}",
                server.uri(),
                end - 1
            ))
            .unwrap()
        })
        .collect();

    let data = blocking(move || {
        let config = StreamConfig::default()
            .with_chunk_capacity(16 * 1024)
            .with_read_slice(4096);
        let files = files(urls, config);
        let fh = files.open(&OpenTarget::Track(TrackRef::new("multi"))).unwrap();
        let data = read_all(&files, fh, 10_000);
        files.release(fh);
        data
    })
    .await;

    assert_eq!(data.len(), 100_000);
    assert_eq!(data, logical(0..100_000));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_segment_truncates_stream() {
    let server = MockServer::start().await;
    Mock::given(path("/part/0"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(logical(0..2000)))
        .mount(&server)
        .await;
    Mock::given(path("/part/1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let urls = vec![
        Url::parse(&format!("{}/part/0?range=0-1999", server.uri())).unwrap(),
        Url::parse(&format!("{}/part/1?range=1500-3999", server.uri())).unwrap(),
    ];

    let data = blocking(move || {
        let files = files(urls, StreamConfig::default());
        let fh = files.open(&OpenTarget::Track(TrackRef::new("broken"))).unwrap();
        let data = read_all(&files, fh, 4096);
        files.release(fh);
        data
    })
    .await;

    assert_eq!(data, logical(0..2000));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cover_art_is_passed_through() {
    let server = MockServer::start().await;
    let image = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    Mock::given(path("/cover.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(image.clone()))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/cover.png", server.uri())).unwrap();
    let data = blocking(move || {
        let files = files(vec![url], StreamConfig::default());
        let fh = files.open(&OpenTarget::Cover(AlbumRef::new("album"))).unwrap();
        read_all(&files, fh, 4096)
    })
    .await;

    assert_eq!(data, image);
}
