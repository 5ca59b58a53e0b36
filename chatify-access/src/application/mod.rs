pub mod dispatch;

pub use dispatch::MessageDispatcher;
