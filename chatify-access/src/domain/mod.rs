pub mod manager;
pub mod model;
pub mod repositories;


pub use manager::ConnectionManager;
pub use model::{ClientIdentity, SendOutcome};
pub use repositories::{DispatchError, EventPublisher, UpstreamDispatcher};
