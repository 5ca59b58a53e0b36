pub mod model;
pub mod replay;
pub mod repositories;
pub mod service;

#[cfg(test)]
mod replay_test;

pub use model::{DeliveryFailure, MessageStatus, PersistedMessage, StatusUpdate};
pub use replay::PresenceReplayService;
pub use service::PushDomainService;
