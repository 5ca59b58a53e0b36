pub mod grpc;
pub mod ws;

pub use grpc::{AccessGrpcHandler, GrpcServer};
pub use ws::WsListener;
