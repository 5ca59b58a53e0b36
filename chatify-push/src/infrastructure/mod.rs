pub mod directory;
pub mod offline_client;
pub mod persistence;

pub use directory::AccessDirectory;
pub use offline_client::OfflineGrpcClient;
pub use persistence::PostgresMessageRepository;
