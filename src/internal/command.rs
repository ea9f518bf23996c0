use bytes::Bytes;
use tokio::sync::oneshot;

use crate::{BrokerStats, Client, ClientId};

/// Messages processed, one at a time, by the broker's control loop.
#[derive(Debug)]
pub enum BrokerCommand {
    Register(Client),
    Unregister(ClientId),
    Publish(Bytes),
    Stats(oneshot::Sender<BrokerStats>),
}
