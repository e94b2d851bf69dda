// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;
use crate::body;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn get(uri: &str) -> Request<ForwardBody> {
    Request::builder().uri(uri).body(body::empty()).unwrap()
}

/// Address nothing listens on.
async fn closed_addr() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Accepts one connection, reads the request head and answers after `delay`.
async fn slow_upstream(delay: Duration) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).await;
        tokio::time::sleep(delay).await;
        let _ = stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .await;
    });
    addr
}

#[test]
fn test_config_defaults() {
    let config = TransportConfig::default();
    assert_eq!(config.connect_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.response_header_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.pool_max_idle_per_host, 32);
    assert!(config.nodelay);
}

#[test]
fn test_config_deserializes_with_defaults() {
    let config: TransportConfig =
        serde_json::from_value(serde_json::json!({ "response_header_timeout_ms": 0 })).unwrap();
    assert_eq!(config.response_header_timeout(), None);
    assert_eq!(config.connect_timeout_ms, 30_000);
    assert_eq!(config.pool_idle_timeout_ms, 90_000);
}

#[test]
fn test_config_builders() {
    let config = TransportConfig::default()
        .with_response_header_timeout(Duration::from_millis(5))
        .with_connect_timeout(Duration::from_millis(250));
    assert_eq!(config.response_header_timeout(), Some(Duration::from_millis(5)));
    assert_eq!(config.connect_timeout(), Some(Duration::from_millis(250)));
}

#[test]
fn test_sub_millisecond_timeouts_stay_enabled() {
    let config = TransportConfig::default()
        .with_response_header_timeout(Duration::from_micros(900))
        .with_connect_timeout(Duration::from_nanos(1));
    assert_eq!(config.response_header_timeout(), Some(Duration::from_millis(1)));
    assert_eq!(config.connect_timeout(), Some(Duration::from_millis(1)));

    let disabled = TransportConfig::default().with_response_header_timeout(Duration::ZERO);
    assert_eq!(disabled.response_header_timeout(), None);
}

#[tokio::test]
async fn test_http_transport_rejects_https() {
    let transport = HttpTransport::default();
    let err = transport
        .round_trip(get("https://example.com/"))
        .await
        .unwrap_err();
    assert!(matches!(err, ForwardError::InvalidTarget(_)));
}

#[tokio::test]
async fn test_http_transport_connection_refused() {
    let addr = closed_addr().await;
    let transport = HttpTransport::default();

    let err = transport
        .round_trip(get(&format!("http://{addr}/")))
        .await
        .unwrap_err();

    assert!(matches!(err, ForwardError::Connect(_)), "unexpected error: {err}");
    assert_eq!(err.status_code(), hyper::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_http_transport_response_header_timeout() {
    let addr = slow_upstream(Duration::from_millis(200)).await;
    let transport = HttpTransport::new(
        TransportConfig::default().with_response_header_timeout(Duration::from_millis(5)),
    );

    let err = transport
        .round_trip(get(&format!("http://{addr}/")))
        .await
        .unwrap_err();

    assert!(matches!(err, ForwardError::Timeout(d) if d == Duration::from_millis(5)));
}

#[tokio::test]
async fn test_http_transport_round_trip() {
    let addr = slow_upstream(Duration::ZERO).await;
    let transport = HttpTransport::default();

    let response = transport
        .round_trip(get(&format!("http://{addr}/")))
        .await
        .unwrap();

    assert_eq!(response.status(), hyper::StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"hello");
}

#[tokio::test]
async fn test_reqwest_transport_connection_refused() {
    let addr = closed_addr().await;
    let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();

    let err = transport
        .round_trip(get(&format!("http://{addr}/")))
        .await
        .unwrap_err();

    assert!(matches!(err, ForwardError::Connect(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn test_reqwest_transport_response_header_timeout() {
    let addr = slow_upstream(Duration::from_millis(200)).await;
    let config = TransportConfig::default().with_response_header_timeout(Duration::from_millis(5));
    let transport = ReqwestTransport::new(&config).unwrap();

    let err = transport
        .round_trip(get(&format!("http://{addr}/")))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_reqwest_transport_round_trip() {
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(header("x-kept", "yes"))
        .and(body_string("payload"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-upstream", "reqwest")
                .set_body_string("created"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let transport = ReqwestTransport::new(&TransportConfig::default()).unwrap();
    let request = Request::post(format!("{}/submit", upstream.uri()))
        .header("x-kept", "yes")
        .body(body::full("payload"))
        .unwrap();

    let response = transport.round_trip(request).await.unwrap();

    assert_eq!(response.status(), hyper::StatusCode::CREATED);
    assert_eq!(response.headers()["x-upstream"], "reqwest");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"created");

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received[0].headers.get("accept").unwrap(), "*/*");
}
