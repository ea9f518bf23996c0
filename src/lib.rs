//! Pulsecast - polling relay with server-sent-event fan-out
//!
//! A [`Relay`] polls an upstream [`Source`] on a fixed interval and publishes
//! every payload to the [`Broker`]. The broker is a single-owner actor: it
//! assigns monotonic event ids, remembers the last event for clients that join
//! later, and hands each event to every registered [`Client`] under a
//! per-client delivery deadline. The [`transport`] module exposes the client
//! side as an SSE endpoint.
//!
//! ```rust,no_run
//! use pulsecast::{Broker, Client, Config};
//!
//! # async fn demo() -> pulsecast::Result<()> {
//! let config = Config::default();
//! let broker = Broker::start(&config);
//! let handle = broker.handle();
//!
//! let (client, mut queue) = Client::new(config.client_queue_size);
//! handle.register(client)?;
//! handle.publish(&br#"{"id":1}"#[..])?;
//!
//! let event = queue.recv().await;
//! assert_eq!(event.map(|e| e.id()), Some(0));
//! broker.stop().await
//! # }
//! ```

mod broker;
mod client;
mod config;
mod error;
mod event;
mod internal;
mod relay;

pub mod logging;
pub mod transport;

pub use broker::{Broker, BrokerHandle, BrokerStats};
pub use client::{Client, ClientId};
pub use config::Config;
pub use error::Error;
pub use event::Event;
pub use relay::{HttpSource, Relay, Source};

pub type Result<T = ()> = std::result::Result<T, Error>;
pub type EventId = u64;
