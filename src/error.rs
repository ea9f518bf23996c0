use tokio::sync::mpsc::error::TrySendError;

use crate::internal::BrokerCommand;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("The broker is no longer running.")]
    BrokerClosed,

    #[error("The broker's command queue has reached its capacity.")]
    ChannelIsFull,

    #[error("Task join error: {0}")]
    TaskJoinError(#[from] tokio::task::JoinError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream request failed: status={status} body={body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl From<TrySendError<BrokerCommand>> for Error {
    fn from(e: TrySendError<BrokerCommand>) -> Self {
        match e {
            TrySendError::Full(_) => Error::ChannelIsFull,
            TrySendError::Closed(_) => Error::BrokerClosed,
        }
    }
}
