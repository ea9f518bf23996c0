use std::{net::SocketAddr, time::Duration};

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    routing::get,
};
use pulsecast::{Error, HttpSource, Source};
use tokio::net::TcpListener;

async fn todo(headers: HeaderMap) -> (StatusCode, &'static str) {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if agent.starts_with("pulsecast/") && accept == "application/json" {
        (StatusCode::OK, "{\n  \"id\": 1,\n  \"completed\": false\n}")
    } else {
        (StatusCode::BAD_REQUEST, "missing headers")
    }
}

async fn upstream() -> SocketAddr {
    let app = Router::new()
        .route("/todos/1", get(todo))
        .route(
            "/down",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "  upstream down\n") }),
        )
        .route("/html", get(|| async { "<html>not json</html>" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

fn source(addr: SocketAddr, path: &str) -> HttpSource {
    HttpSource::new(format!("http://{addr}{path}"), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_body_verbatim() {
    let addr = upstream().await;
    let body = source(addr, "/todos/1").fetch().await.unwrap();
    assert_eq!(body.as_ref(), b"{\n  \"id\": 1,\n  \"completed\": false\n}");
}

#[tokio::test]
async fn test_fetch_rejects_error_status() {
    let addr = upstream().await;
    match source(addr, "/down").fetch().await {
        Err(Error::UpstreamStatus { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream down");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_rejects_non_json_body() {
    let addr = upstream().await;
    let res = source(addr, "/html").fetch().await;
    assert!(matches!(res, Err(Error::Json(_))), "{res:?}");
}

#[tokio::test]
async fn test_fetch_times_out() {
    let addr = upstream().await;
    let slow = HttpSource::new(format!("http://{addr}/slow"), Duration::from_millis(200)).unwrap();
    let res = slow.fetch().await;
    assert!(matches!(res, Err(Error::Http(ref e)) if e.is_timeout()), "{res:?}");
}

#[tokio::test]
async fn test_connection_refused_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let res = source(addr, "/").fetch().await;
    assert!(matches!(res, Err(Error::Http(_))), "{res:?}");
}

#[test]
fn test_location_is_url() {
    let source = HttpSource::new("http://localhost:1/pulse", Duration::from_secs(1)).unwrap();
    assert_eq!(source.location(), "http://localhost:1/pulse");
    assert_eq!(source.url(), "http://localhost:1/pulse");
}
