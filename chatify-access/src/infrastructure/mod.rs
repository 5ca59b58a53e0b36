pub mod messaging;

pub use messaging::KafkaEventPublisher;
