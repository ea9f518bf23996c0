use bytes::Bytes;
use tokio::{
    sync::{
        mpsc::{Sender, channel, error::TrySendError},
        oneshot,
    },
    runtime::Handle,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    Client, ClientId, Config, Error, EventId, Result,
    internal::{BrokerCommand, EventBroker},
};

/// Snapshot of the broker's state, as seen by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    /// Number of registered clients.
    pub clients: usize,
    /// Id the next published event will get.
    pub next_event_id: EventId,
    /// Id of the event that would be replayed to a joining client.
    pub last_event_id: Option<EventId>,
}

/// Owns the running broker task.
///
/// - `start(config)` spawns the control loop and returns immediately.
/// - `handle()` hands out [`BrokerHandle`]s for publishers and transports.
/// - `stop()` cancels the loop and waits for it to finish. All registry
///   entries are dropped, which closes every client's queue.
#[derive(Debug)]
pub struct Broker {
    handle: BrokerHandle,
    task: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Broker {
    /// Spawn the broker's control loop on the current tokio runtime.
    pub fn start(config: &Config) -> Broker {
        let (tx, rx) = channel::<BrokerCommand>(config.command_queue_size.max(1));
        let cancel_token = CancellationToken::new();
        let mut broker = EventBroker::new(rx, config.event_send_timeout, cancel_token.clone());
        let task = tokio::spawn(async move { broker.run().await });
        Broker {
            handle: BrokerHandle { sender: tx },
            task,
            cancel_token,
        }
    }

    pub fn handle(&self) -> BrokerHandle {
        self.handle.clone()
    }

    /// Request shutdown, then await the control loop.
    pub async fn stop(self) -> Result<()> {
        self.cancel_token.cancel();
        self.task.await?;
        Ok(())
    }
}

/// Cheap, clonable entry point to a running broker.
///
/// `register`, `unregister` and `publish` enqueue a command and return at
/// once; they never wait for the control loop. An `Err` means the command
/// was not accepted: either the broker has stopped
/// ([`Error::BrokerClosed`]) or its command queue is full
/// ([`Error::ChannelIsFull`], never returned by `unregister`).
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    sender: Sender<BrokerCommand>,
}

impl BrokerHandle {
    /// Add `client` to the registry. If an event has already been
    /// broadcast, the most recent one is delivered to this client first.
    pub fn register(&self, client: Client) -> Result<()> {
        self.dispatch(BrokerCommand::Register(client))
    }

    /// Remove a client from the registry. Unknown ids are ignored.
    ///
    /// Never rejected for a full command queue: the command is then handed
    /// to a task that waits for room, so it still lands behind everything
    /// already queued (including the client's own registration).
    pub fn unregister(&self, client_id: &ClientId) -> Result<()> {
        match self.sender.try_send(BrokerCommand::Unregister(client_id.clone())) {
            Err(TrySendError::Full(cmd)) => {
                let runtime = Handle::try_current().map_err(|_| Error::ChannelIsFull)?;
                let sender = self.sender.clone();
                runtime.spawn(async move {
                    let _ = sender.send(cmd).await;
                });
                Ok(())
            }
            res => Ok(res?),
        }
    }

    /// Broadcast `payload` as the next event to every registered client.
    pub fn publish<P: Into<Bytes>>(&self, payload: P) -> Result<()> {
        self.dispatch(BrokerCommand::Publish(payload.into()))
    }

    /// Query the broker's state.
    ///
    /// Answered in order with the other commands, so every command sent
    /// from this task before the call has been processed once it returns.
    pub async fn stats(&self) -> Result<BrokerStats> {
        let (resp, stats) = oneshot::channel();
        self.sender
            .send(BrokerCommand::Stats(resp))
            .await
            .map_err(|_| Error::BrokerClosed)?;
        stats.await.map_err(|_| Error::BrokerClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    #[inline]
    fn dispatch(&self, cmd: BrokerCommand) -> Result<()> {
        self.sender.try_send(cmd)?;
        Ok(())
    }
}
