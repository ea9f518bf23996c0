use std::{ops::Deref, sync::Arc};

use tokio::sync::mpsc::{Receiver, Sender, channel};
use uuid::Uuid;

use crate::Event;

/// Identity of a connected client.
///
/// Generated once per connection by [`Client::new`]; cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(Arc<str>);

impl ClientId {
    pub fn new<N: Into<Arc<str>>>(id: N) -> Self {
        Self(id.into())
    }

    fn generate() -> Self {
        Self::new(format!("client-{}", Uuid::new_v4()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for ClientId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The broker's side of a subscriber: an id plus the sending half of the
/// client's bounded inbound queue.
///
/// The receiving half stays with whoever drains the queue (normally the
/// transport adapter). Once that half is dropped, deliveries to the client
/// fail fast instead of waiting out their deadline.
#[derive(Debug, Clone)]
pub struct Client {
    id: ClientId,
    sender: Sender<Arc<Event>>,
}

impl Client {
    /// Create a client with a fresh id and an inbound queue of `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> (Client, Receiver<Arc<Event>>) {
        Self::with_id(ClientId::generate(), capacity)
    }

    /// Same as [`Client::new`] but with a caller-chosen id.
    pub fn with_id(id: ClientId, capacity: usize) -> (Client, Receiver<Arc<Event>>) {
        let (sender, receiver) = channel(capacity);
        (Client { id, sender }, receiver)
    }

    #[inline]
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    #[inline]
    pub(crate) fn sender(&self) -> &Sender<Arc<Event>> {
        &self.sender
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Client {}
