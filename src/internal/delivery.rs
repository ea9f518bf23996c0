use std::sync::Arc;

use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    time::{Duration, Instant, timeout_at},
};
use tracing::{debug, trace, warn};

use crate::{Client, Event};

#[derive(Debug)]
struct Delivery {
    event: Arc<Event>,
    deadline: Instant,
}

/// Pending deliveries for one client.
///
/// Each registered client owns exactly one outbox and one worker task that
/// drains it. Deliveries are stamped with their deadline when pushed, so a
/// stalled client delays nothing but its own queue and every delivery still
/// expires `send_timeout` after it was broadcast.
#[derive(Debug)]
pub(crate) struct Outbox {
    sender: UnboundedSender<Delivery>,
    send_timeout: Duration,
}

impl Outbox {
    /// Spawn the delivery worker for `client`. The worker ends when the
    /// outbox is dropped or the client's queue closes.
    pub fn spawn(client: Client, send_timeout: Duration) -> Self {
        let (sender, receiver) = unbounded_channel();
        let worker = DeliveryWorker { client, receiver };
        tokio::spawn(worker.run());
        Self {
            sender,
            send_timeout,
        }
    }

    pub fn push(&self, event: Arc<Event>) {
        let delivery = Delivery {
            event,
            deadline: Instant::now() + self.send_timeout,
        };
        // Fails only once the worker has seen a closed client queue.
        let _ = self.sender.send(delivery);
    }
}

struct DeliveryWorker {
    client: Client,
    receiver: UnboundedReceiver<Delivery>,
}

impl DeliveryWorker {
    async fn run(mut self) {
        while let Some(Delivery { event, deadline }) = self.receiver.recv().await {
            let event_id = event.id();
            match timeout_at(deadline, self.client.sender().send(event)).await {
                Ok(Ok(())) => {
                    trace!(client = %self.client.id(), event = event_id, "event delivered");
                }
                Ok(Err(_)) => {
                    debug!(client = %self.client.id(), "client queue closed, stopping delivery");
                    break;
                }
                Err(_) => {
                    warn!(
                        client = %self.client.id(),
                        event = event_id,
                        "timeout sending event to client exceeded, ignoring event"
                    );
                }
            }
        }
    }
}
