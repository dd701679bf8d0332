mod common;

use a3d_archive::open::{LoadMode, load_location, load_url_with_fallback};
use a3d_archive::{Archive, ArchiveError, HttpRangeReader, ReadAt, ReaderConfig};
use common::{Method, ZipBuilder, manifest_json, noise};
use std::io::{Read, Write};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves `bytes=a-b` ranges of a fixed body, optionally capping each response.
struct RangeResponder {
    body: Vec<u8>,
    max_chunk: Option<usize>,
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some(range) = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
        else {
            return ResponseTemplate::new(200).set_body_bytes(self.body.clone());
        };

        let (start, end) = range.split_once('-').unwrap();
        let start: usize = start.parse().unwrap();
        let mut end: usize = end.parse().unwrap();
        if let Some(max) = self.max_chunk {
            end = end.min(start + max - 1);
        }

        ResponseTemplate::new(206)
            .insert_header(
                "content-range",
                format!("bytes {start}-{end}/{}", self.body.len()).as_str(),
            )
            .set_body_bytes(self.body[start..=end].to_vec())
    }
}

fn container() -> (Vec<u8>, Vec<u8>) {
    let splat = noise(30_000, 21);
    let mut zip = ZipBuilder::new();
    zip.add("manifest.json", manifest_json().as_bytes(), Method::Deflate)
        .add("scene_0.ply", &splat, Method::Stored)
        .add("thumbnail_0.jpg", &[0xD8; 1500], Method::Deflate);
    (zip.finish(), splat)
}

async fn serve(body: Vec<u8>, max_chunk: Option<usize>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/capture.a3d"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("accept-ranges", "bytes")
                .insert_header("content-length", body.len().to_string().as_str())
                .set_body_bytes(body.clone()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/capture.a3d"))
        .respond_with(RangeResponder { body, max_chunk })
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_remote_container_over_ranges() {
    let (data, splat) = container();
    let server = serve(data, None).await;
    let url = format!("{}/capture.a3d", server.uri());

    let mut archive = Archive::default();
    archive.load_remote(&url).await.unwrap();
    archive.parse_manifest().await.unwrap();
    assert!(archive.content_info().has_splat);

    let file = archive.extract_file("scene_0.ply").await.unwrap().unwrap();
    assert_eq!(&file.data[..], &splat[..]);

    let transferred = archive.transferred_bytes().unwrap();
    assert!(transferred > splat.len() as u64);

    // A second extraction is served from the cache
    archive.extract_file("scene_0.ply").await.unwrap();
    assert_eq!(archive.transferred_bytes().unwrap(), transferred);
}

#[tokio::test]
async fn test_range_reader_reads_exact_slices() {
    let (data, _) = container();
    let server = serve(data.clone(), None).await;
    let url = format!("{}/capture.a3d", server.uri());

    let reader = HttpRangeReader::new(url, &ReaderConfig::default())
        .await
        .unwrap();
    assert_eq!(reader.size(), data.len() as u64);

    let slice = reader.read_bytes(100, 500).await.unwrap();
    assert_eq!(&slice[..], &data[100..600]);
    assert_eq!(reader.transferred_bytes(), 500);

    let err = reader
        .read_bytes(data.len() as u64 - 10, 20)
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::OutOfRange { .. }));
}

#[tokio::test]
async fn test_short_range_responses_are_continued() {
    let (data, _) = container();
    let server = serve(data.clone(), Some(4096)).await;
    let url = format!("{}/capture.a3d", server.uri());

    let reader = HttpRangeReader::new(url, &ReaderConfig::default())
        .await
        .unwrap();
    let slice = reader.read_bytes(10, 20_000).await.unwrap();
    assert_eq!(&slice[..], &data[10..20_010]);
}

#[tokio::test]
async fn test_head_error_status_is_io_error() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut archive = Archive::default();
    let err = archive
        .load_remote(&format!("{}/missing.a3d", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::HttpStatus(s) if s.as_u16() == 404));
    assert_eq!(err.reason(), "io_error");
    assert!(!archive.is_loaded());
}

#[tokio::test]
async fn test_range_error_status_is_io_error() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-length", "1000")
                .set_body_bytes(vec![0u8; 1000]),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(416))
        .mount(&server)
        .await;

    let reader = HttpRangeReader::new(format!("{}/c.a3d", server.uri()), &ReaderConfig::default())
        .await
        .unwrap();
    let err = reader.read_bytes(0, 10).await.unwrap_err();
    assert!(err.is_io());
}

/// One-shot server whose HEAD answer carries no Content-Length at all.
fn serve_without_length() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\naccept-ranges: bytes\r\nconnection: close\r\n\r\n")
            .unwrap();
    });
    format!("http://{addr}/capture.a3d")
}

#[tokio::test]
async fn test_head_without_content_length_is_io_error() {
    let url = serve_without_length();

    let err = HttpRangeReader::new(url, &ReaderConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::MissingContentLength));
    assert_eq!(err.reason(), "io_error");
}

#[tokio::test]
async fn test_full_response_to_range_is_sliced() {
    let (data, _) = container();
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-length", data.len().to_string().as_str())
                .set_body_bytes(data.clone()),
        )
        .mount(&server)
        .await;
    // Ignores Range and always sends the whole resource
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .mount(&server)
        .await;

    let url = format!("{}/capture.a3d", server.uri());

    let reader = HttpRangeReader::new(url, &ReaderConfig::default())
        .await
        .unwrap();
    let slice = reader.read_bytes(1000, 300).await.unwrap();
    assert_eq!(&slice[..], &data[1000..1300]);
    assert_eq!(reader.transferred_bytes(), data.len() as u64);

    let tail = reader.read_bytes(data.len() as u64 - 22, 22).await.unwrap();
    assert_eq!(&tail[..], &data[data.len() - 22..]);
}

#[tokio::test]
async fn test_fallback_downloads_whole_container() {
    let (data, splat) = container();
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/capture.a3d"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data))
        .expect(1)
        .mount(&server)
        .await;
    let url = format!("{}/capture.a3d", server.uri());

    let mut archive = Archive::default();
    let mode = load_url_with_fallback(&mut archive, &url).await.unwrap();
    assert_eq!(mode, LoadMode::FullDownload);
    assert!(archive.transferred_bytes().is_none());

    let file = archive.extract_file("scene_0.ply").await.unwrap().unwrap();
    assert_eq!(&file.data[..], &splat[..]);
}

#[tokio::test]
async fn test_no_fallback_surfaces_range_failure() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    let url = format!("{}/capture.a3d", server.uri());

    let mut archive = Archive::default();
    let err = load_location(&mut archive, &url, false).await.unwrap_err();
    assert!(err.is_io());
}

#[tokio::test]
async fn test_fallback_does_not_mask_format_errors() {
    let garbage = noise(5000, 22);
    let server = serve(garbage, None).await;
    let url = format!("{}/capture.a3d", server.uri());

    let mut archive = Archive::default();
    let err = load_url_with_fallback(&mut archive, &url).await.unwrap_err();
    assert_eq!(err.reason(), "format_error");
}
