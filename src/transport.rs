//! Server-sent-event transport.
//!
//! `GET /events` registers a new client with the broker and streams every
//! event it receives as `data: {"ID":..,"ReceivedAt":..,"Data":..}\n\n`.
//! `OPTIONS /events` answers the CORS preflight with `204 No Content`.
//!
//! The client is unregistered when its stream is dropped, which happens
//! when the peer disconnects, when a write fails, and when the server shuts
//! down.

use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use axum::{
    Router,
    extract::State,
    http::{
        HeaderName, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONNECTION,
        },
    },
    response::{
        IntoResponse, Response,
        sse::{self, Sse},
    },
    routing::get,
};
use futures_util::Stream;
use tokio::sync::mpsc::Receiver;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::{BrokerHandle, Client, ClientId, Event};

/// Shared state of the `/events` routes.
#[derive(Debug, Clone)]
pub struct EventsState {
    broker: BrokerHandle,
    client_queue_size: usize,
}

impl EventsState {
    /// A `client_queue_size` of 0 is raised to 1.
    pub fn new(broker: BrokerHandle, client_queue_size: usize) -> Self {
        Self {
            broker,
            client_queue_size: client_queue_size.max(1),
        }
    }
}

/// Build the router serving `/events`.
pub fn router(state: EventsState) -> Router {
    Router::new()
        .route("/events", get(stream_events).options(preflight))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_headers() -> [(HeaderName, &'static str); 4] {
    [
        (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
        (
            ACCESS_CONTROL_ALLOW_HEADERS,
            "Cache-Control, Content-Type, X-Requested-With",
        ),
        (ACCESS_CONTROL_MAX_AGE, "86400"),
    ]
}

async fn preflight() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, cors_headers())
}

async fn stream_events(State(state): State<EventsState>) -> Response {
    let (client, receiver) = Client::new(state.client_queue_size);
    let client_id = client.id().clone();

    if let Err(e) = state.broker.register(client) {
        error!(client = %client_id, error = %e, "client registration rejected");
        return (StatusCode::SERVICE_UNAVAILABLE, cors_headers()).into_response();
    }
    info!(client = %client_id, "client connected");

    let stream = ClientStream::new(client_id, receiver, state.broker);
    (cors_headers(), [(CONNECTION, "keep-alive")], Sse::new(stream)).into_response()
}

/// Drains one client's queue as SSE frames.
///
/// Events that cannot be encoded are skipped. Dropping the stream
/// unregisters the client; unregistering twice is harmless.
pub struct ClientStream {
    client_id: ClientId,
    receiver: Receiver<Arc<Event>>,
    broker: BrokerHandle,
}

impl ClientStream {
    pub fn new(client_id: ClientId, receiver: Receiver<Arc<Event>>, broker: BrokerHandle) -> Self {
        Self {
            client_id,
            receiver,
            broker,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

impl Stream for ClientStream {
    type Item = Result<sse::Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(event) = ready!(self.receiver.poll_recv(cx)) else {
                return Poll::Ready(None);
            };
            match event.to_json() {
                Ok(json) => {
                    let frame = sse::Event::default().data(json);
                    return Poll::Ready(Some(Ok(frame)));
                }
                Err(e) => {
                    warn!(
                        client = %self.client_id,
                        event = event.id(),
                        error = %e,
                        "marshal event payload failed"
                    );
                }
            }
        }
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        if let Err(e) = self.broker.unregister(&self.client_id) {
            debug!(client = %self.client_id, error = %e, "unregister not delivered");
        }
        info!(client = %self.client_id, "client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, BodyDataStream},
        http::{
            Method, Request,
            header::{CACHE_CONTROL, CONTENT_TYPE},
        },
    };
    use futures_util::StreamExt;
    use tokio::time::Duration;
    use tower::ServiceExt;

    use super::*;
    use crate::{Broker, Config};

    fn request(method: Method) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/events")
            .body(Body::empty())
            .unwrap()
    }

    async fn next_frame(body: &mut BodyDataStream) -> String {
        let mut buf = String::new();
        while !buf.ends_with("\n\n") {
            let chunk = body.next().await.unwrap().unwrap();
            buf.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        buf
    }

    fn setup() -> (Broker, Router) {
        let config = Config::default();
        let broker = Broker::start(&config);
        let app = router(EventsState::new(broker.handle(), config.client_queue_size));
        (broker, app)
    }

    #[tokio::test]
    async fn test_preflight_returns_no_content_with_cors() {
        let (broker, app) = setup();
        let resp = app.oneshot(request(Method::OPTIONS)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let headers = resp.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_HEADERS],
            "Cache-Control, Content-Type, X-Requested-With"
        );
        assert_eq!(headers[ACCESS_CONTROL_MAX_AGE], "86400");
        assert_eq!(broker.handle().stats().await.unwrap().clients, 0);
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_headers_and_frame() {
        let (broker, app) = setup();
        let handle = broker.handle();
        let resp = app.oneshot(request(Method::GET)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers();
        assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[CONNECTION], "keep-alive");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        assert_eq!(handle.stats().await.unwrap().clients, 1);
        handle.publish(&br#"{"id":1}"#[..]).unwrap();

        let mut body = resp.into_body().into_data_stream();
        let frame = next_frame(&mut body).await;
        assert!(frame.starts_with(r#"data: {"ID":0,"ReceivedAt":""#), "{frame}");
        assert!(frame.ends_with(concat!(r#","Data":{"id":1}}"#, "\n\n")));
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unencodable_event_is_skipped() {
        let (broker, app) = setup();
        let handle = broker.handle();
        let resp = app.oneshot(request(Method::GET)).await.unwrap();
        handle.stats().await.unwrap();

        handle.publish(&b"definitely not json"[..]).unwrap();
        handle.publish(&br#"{"ok":true}"#[..]).unwrap();

        let mut body = resp.into_body().into_data_stream();
        let frame = next_frame(&mut body).await;
        assert!(frame.starts_with(r#"data: {"ID":1,"#), "{frame}");
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_multiline_payload_is_one_data_line() {
        let (broker, app) = setup();
        let handle = broker.handle();
        let resp = app.oneshot(request(Method::GET)).await.unwrap();
        handle.stats().await.unwrap();

        handle.publish("{\r\n  \"id\": 1,\n  \"done\": false\n}").unwrap();

        let mut body = resp.into_body().into_data_stream();
        let frame = next_frame(&mut body).await;
        assert_eq!(frame.matches("data:").count(), 1);
        assert!(frame.ends_with(concat!(r#""Data":{"id":1,"done":false}}"#, "\n\n")));
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_stream_unregisters() {
        let (broker, app) = setup();
        let handle = broker.handle();
        let resp = app.oneshot(request(Method::GET)).await.unwrap();
        assert_eq!(handle.stats().await.unwrap().clients, 1);

        drop(resp);
        assert_eq!(handle.stats().await.unwrap().clients, 0);
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_survives_full_command_queue() {
        let broker = Broker::start(&Config::default().with_command_queue_size(2));
        let handle = broker.handle();
        let (client, receiver) = Client::new(4);
        let client_id = client.id().clone();
        handle.register(client).unwrap();
        assert_eq!(handle.stats().await.unwrap().clients, 1);

        handle.publish(&b"1"[..]).unwrap();
        handle.publish(&b"2"[..]).unwrap();
        assert!(matches!(handle.publish(&b"3"[..]), Err(crate::Error::ChannelIsFull)));

        drop(ClientStream::new(client_id, receiver, handle.clone()));

        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while handle.stats().await.unwrap().clients != 0 {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(drained.is_ok());
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_queue_size_still_streams() {
        let broker = Broker::start(&Config::default());
        let handle = broker.handle();
        let app = router(EventsState::new(handle.clone(), 0));
        let resp = app.oneshot(request(Method::GET)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(handle.stats().await.unwrap().clients, 1);

        handle.publish(&br#"{"id":1}"#[..]).unwrap();
        let mut body = resp.into_body().into_data_stream();
        let frame = next_frame(&mut body).await;
        assert!(frame.starts_with(r#"data: {"ID":0,"#), "{frame}");
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_broker_rejects_stream() {
        let (broker, app) = setup();
        broker.stop().await.unwrap();
        let resp = app.oneshot(request(Method::GET)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stream_ends_when_broker_stops() {
        let (broker, app) = setup();
        let handle = broker.handle();
        let resp = app.oneshot(request(Method::GET)).await.unwrap();
        handle.stats().await.unwrap();

        broker.stop().await.unwrap();
        let mut body = resp.into_body().into_data_stream();
        assert!(body.next().await.is_none());
    }
}
