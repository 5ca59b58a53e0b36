pub mod consumers;
pub mod grpc;

pub use consumers::UserStateConsumer;
pub use grpc::{GrpcServer, PushGrpcHandler};
