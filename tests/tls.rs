//! TLS provisioning, ALPN selection, and both encrypted framings.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Request, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use swift_server::config::ServerConfig;

mod common;

#[tokio::test]
async fn http11_over_tls_streams_exact_bytes() {
    let root = common::document_root();
    let server =
        common::start_server(ServerConfig::static_files(0, root.path()).with_self_signed_tls(false))
            .await;

    let mut tls = common::tls_connect(&server, &[]).await;
    assert_eq!(tls.get_ref().1.alpn_protocol(), None);

    tls.write_all(b"GET /big.bin HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(10), tls.read_to_end(&mut raw))
        .await
        .unwrap();

    let (head, body) = common::split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains(&format!("content-length: {}", common::BIG_FILE_LEN)));
    assert_eq!(body, common::big_file());
}

#[tokio::test]
async fn negotiation_without_h2_support_in_client_uses_http11() {
    let root = common::document_root();
    let server =
        common::start_server(ServerConfig::static_files(0, root.path()).with_self_signed_tls(true))
            .await;

    let mut tls = common::tls_connect(&server, &[b"http/1.1"]).await;
    assert_eq!(tls.get_ref().1.alpn_protocol(), Some(&b"http/1.1"[..]));

    tls.write_all(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(10), tls.read_to_end(&mut raw))
        .await
        .unwrap();
    let (head, body) = common::split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, b"<h1>swift</h1>\n");
}

#[tokio::test]
async fn h2_is_negotiated_and_served() {
    let root = common::document_root();
    let server =
        common::start_server(ServerConfig::static_files(0, root.path()).with_self_signed_tls(true))
            .await;

    let tls = common::tls_connect(&server, &[b"h2", b"http/1.1"]).await;
    assert_eq!(tls.get_ref().1.alpn_protocol(), Some(&b"h2"[..]));

    let (mut sender, connection) =
        hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(tls))
            .await
            .unwrap();
    tokio::spawn(connection);

    // Successful file replies keep the connection open for further streams.
    for _ in 0..2 {
        let big = Request::get("https://localhost/big.bin")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let res = sender.send_request(big).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["cache-control"], "private, max-age=3600");
        assert!(res.headers().get("connection").is_none());
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.to_vec(), common::big_file());
    }
}

#[tokio::test]
async fn h2_failure_reply_closes_connection() {
    let root = common::document_root();
    let server =
        common::start_server(ServerConfig::static_files(0, root.path()).with_self_signed_tls(true))
            .await;

    let tls = common::tls_connect(&server, &[b"h2"]).await;
    let (mut sender, connection) =
        hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(tls))
            .await
            .unwrap();
    let connection = tokio::spawn(connection);

    let missing = Request::get("https://localhost/missing.txt")
        .body(Empty::<Bytes>::new())
        .unwrap();
    let res = sender.send_request(missing).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Failure: 404 Not Found\r\n");

    // GOAWAY follows the reply and the connection winds down.
    let _ = tokio::time::timeout(Duration::from_secs(10), connection)
        .await
        .unwrap()
        .unwrap();
    assert!(sender.is_closed());

    let next = Request::get("https://localhost/index.html")
        .body(Empty::<Bytes>::new())
        .unwrap();
    assert!(sender.send_request(next).await.is_err());
}

#[tokio::test]
async fn failed_handshake_gets_no_http_response() {
    let root = common::document_root();
    let server =
        common::start_server(ServerConfig::static_files(0, root.path()).with_self_signed_tls(false))
            .await;

    let mut plain = TcpStream::connect(server.addr).await.unwrap();
    plain
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut raw = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(10), plain.read_to_end(&mut raw))
        .await
        .unwrap();
    assert!(!raw.starts_with(b"HTTP/"));

    // The listener keeps serving well-behaved clients.
    let mut tls = common::tls_connect(&server, &[]).await;
    tls.write_all(b"GET /docs/guide.txt HTTP/1.0\r\n\r\n")
        .await
        .unwrap();
    let mut raw = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(10), tls.read_to_end(&mut raw))
        .await
        .unwrap();
    let (_, body) = common::split_response(&raw);
    assert_eq!(body, b"read me\n");
}
