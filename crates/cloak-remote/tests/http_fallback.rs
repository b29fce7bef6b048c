//! Range behavior over URL links, against a real local HTTP server
//!
//! Two server personalities: one honors `Range:` with 206 responses, one
//! ignores it and always answers 200 with the full body. The adapter must
//! produce byte-identical ranges either way.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use cloak_crypto::stream::RangeSource;
use cloak_remote::{LinkSource, RemoteLink};

const OBJECT_LEN: usize = 10_000;

fn test_data() -> Vec<u8> {
    (0..OBJECT_LEN).map(|i| (i % 251) as u8).collect()
}

fn parse_range(value: Option<&hyper::header::HeaderValue>) -> Option<(u64, Option<u64>)> {
    let spec = value?.to_str().ok()?.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start, end))
}

fn respond(req: &Request<Incoming>, honor_ranges: bool) -> Response<Full<Bytes>> {
    let data = test_data();
    if honor_ranges {
        if let Some((start, end)) = parse_range(req.headers().get(hyper::header::RANGE)) {
            let start = (start as usize).min(data.len());
            let end = end
                .map(|e| ((e + 1) as usize).min(data.len()))
                .unwrap_or(data.len());
            return Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .body(Full::new(Bytes::copy_from_slice(&data[start..end])))
                .unwrap();
        }
    }
    Response::new(Full::new(Bytes::from(data)))
}

async fn spawn_server(honor_ranges: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let io = TokioIo::new(stream);
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| async move {
                    Ok::<_, Infallible>(respond(&req, honor_ranges))
                });
                http1::Builder::new().serve_connection(io, service).await.ok();
            });
        }
    });
    addr
}

fn url_link(addr: SocketAddr) -> RemoteLink {
    RemoteLink::Url {
        url: format!("http://{addr}/object"),
        headers: Vec::new(),
        expiration: None,
    }
}

async fn read_range(source: &LinkSource, offset: u64, length: Option<u64>) -> Vec<u8> {
    let mut reader = source.open(offset, length).await.unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn full_200_server_still_serves_exact_ranges() {
    let addr = spawn_server(false).await;
    let source = LinkSource::new(url_link(addr), OBJECT_LEN as u64).unwrap();
    let data = test_data();

    let body = read_range(&source, 1000, Some(500)).await;
    assert_eq!(body.len(), 500);
    assert_eq!(body, &data[1000..1500]);
}

#[tokio::test]
async fn full_200_server_to_end_read() {
    let addr = spawn_server(false).await;
    let source = LinkSource::new(url_link(addr), OBJECT_LEN as u64).unwrap();
    let data = test_data();

    let body = read_range(&source, 9_900, None).await;
    assert_eq!(body, &data[9_900..]);
}

#[tokio::test]
async fn partial_content_server_passes_through() {
    let addr = spawn_server(true).await;
    let source = LinkSource::new(url_link(addr), OBJECT_LEN as u64).unwrap();
    let data = test_data();

    let body = read_range(&source, 2000, Some(100)).await;
    assert_eq!(body, &data[2000..2100]);
}

#[tokio::test]
async fn whole_object_read() {
    let addr = spawn_server(false).await;
    let source = LinkSource::new(url_link(addr), OBJECT_LEN as u64).unwrap();

    let body = read_range(&source, 0, None).await;
    assert_eq!(body, test_data());
}
