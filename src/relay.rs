use std::future::Future;

use bytes::Bytes;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::de::IgnoredAny;
use tokio::{
    select,
    time::{Duration, MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{BrokerHandle, Error, Result};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Upstream data the relay polls.
///
/// A successful fetch yields the raw payload, which is published unmodified.
pub trait Source: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Bytes>> + Send;

    /// Human readable location of the source, used in logs.
    fn location(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// [`Source`] backed by an HTTP `GET` returning JSON.
///
/// Sends `User-Agent` and `Accept: application/json`, accepts only a 2xx
/// status and only bodies that parse as JSON.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new<U: Into<String>>(url: U, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Source for HttpSource {
    async fn fetch(&self) -> Result<Bytes> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        serde_json::from_slice::<IgnoredAny>(&body)?;
        Ok(body)
    }

    fn location(&self) -> &str {
        &self.url
    }
}

/// Periodically fetches from a [`Source`] and publishes to the broker.
///
/// The first fetch happens as soon as [`Relay::run`] starts, then once per
/// `interval`. A failed fetch is logged and skipped; the next one happens on
/// schedule. Ticks missed because a fetch overran are skipped, not bursted.
pub struct Relay<S: Source> {
    source: S,
    broker: BrokerHandle,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl<S: Source> Relay<S> {
    pub fn new(
        source: S,
        broker: BrokerHandle,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            source,
            broker,
            interval,
            cancel_token,
        }
    }

    /// Poll until the cancellation token fires, including mid-fetch.
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(source = self.source.location(), every = ?self.interval, "relay started");

        loop {
            select! {
                _ = self.cancel_token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            select! {
                _ = self.cancel_token.cancelled() => break,
                res = self.source.fetch() => self.forward(res),
            }
        }

        info!(source = self.source.location(), "relay stopped");
    }

    fn forward(&self, res: Result<Bytes>) {
        match res {
            Ok(payload) => {
                debug!(bytes = payload.len(), "upstream pulse fetched");
                if let Err(e) = self.broker.publish(payload) {
                    warn!(error = %e, "broker rejected pulse");
                }
            }
            Err(e) => {
                warn!(error = %e, url = self.source.location(), "api pulse failed");
            }
        }
    }
}
