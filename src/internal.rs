mod broker;
mod command;
mod delivery;

pub(crate) use broker::EventBroker;
pub(crate) use command::BrokerCommand;
pub(crate) use delivery::Outbox;
