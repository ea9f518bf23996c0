use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use tokio::{select, sync::mpsc::Receiver, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{BrokerCommand, Outbox};
use crate::{BrokerStats, Client, ClientId, Event, EventId};

/// The broker's control loop.
///
/// Sole owner of the client registry, the id sequence and the last event.
/// Commands are handled strictly one at a time and none of them awaits a
/// client: fan-out only pushes onto per-client outboxes.
#[derive(Debug)]
pub(crate) struct EventBroker {
    receiver: Receiver<BrokerCommand>,
    clients: HashMap<ClientId, Outbox>,
    next_event_id: EventId,
    last_event: Option<Arc<Event>>,
    event_send_timeout: Duration,
    cancel_token: CancellationToken,
}

impl EventBroker {
    pub fn new(
        receiver: Receiver<BrokerCommand>,
        event_send_timeout: Duration,
        cancel_token: CancellationToken,
    ) -> EventBroker {
        EventBroker {
            receiver,
            clients: HashMap::new(),
            next_event_id: 0,
            last_event: None,
            event_send_timeout,
            cancel_token,
        }
    }

    pub async fn run(&mut self) {
        loop {
            select! {
                _ = self.cancel_token.cancelled() => break,
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }
        self.shutdown();
    }

    fn handle_command(&mut self, cmd: BrokerCommand) {
        use BrokerCommand::*;
        match cmd {
            Register(client) => self.register(client),
            Unregister(client_id) => self.unregister(&client_id),
            Publish(payload) => self.publish(payload),
            Stats(resp) => {
                let _ = resp.send(self.stats());
            }
        }
    }

    fn register(&mut self, client: Client) {
        let client_id = client.id().clone();
        let outbox = Outbox::spawn(client, self.event_send_timeout);
        if let Some(event) = &self.last_event {
            trace!(client = %client_id, event = event.id(), "replaying last event");
            outbox.push(event.clone());
        }
        if self.clients.insert(client_id.clone(), outbox).is_some() {
            debug!(client = %client_id, "replaced existing registration");
        }
        info!(client = %client_id, "client registered");
    }

    fn unregister(&mut self, client_id: &ClientId) {
        if self.clients.remove(client_id).is_some() {
            info!(client = %client_id, "client unregistered");
        }
    }

    fn publish(&mut self, payload: Bytes) {
        let event = Arc::new(Event::new(self.next_event_id, payload));
        self.next_event_id += 1;
        self.last_event = Some(event.clone());
        debug!(event = event.id(), clients = self.clients.len(), "broadcasting event");
        for outbox in self.clients.values() {
            outbox.push(event.clone());
        }
    }

    fn stats(&self) -> BrokerStats {
        BrokerStats {
            clients: self.clients.len(),
            next_event_id: self.next_event_id,
            last_event_id: self.last_event.as_ref().map(|e| e.id()),
        }
    }

    fn shutdown(&mut self) {
        self.receiver.close();
        let count = self.clients.len();
        self.clients.clear();
        info!(clients = count, "broker stopped");
    }
}
