//! Chatify IM Core 公共库
//!
//! 提供各服务共用的基础能力：
//! - 配置加载（`-conf` 目录 + TOML）
//! - 会话存储（集群内唯一的共享状态）
//! - Kafka 生产者/消费者构建
//! - 消费端去重
//! - 基于 etcd 的服务注册发现

pub mod config;
pub mod dedup;
pub mod discovery;
pub mod events;
pub mod kafka;
pub mod service_names;
pub mod session;
pub mod utils;

pub use config::{
    AppConfig, EtcdConfig, KafkaClusterConfig, PostgresInstanceConfig, RedisPoolConfig,
    ServiceConfig, conf_path_from_args, load_config,
};
pub use dedup::{DedupStore, RedisDedupStore};
pub use discovery::{ServiceInstance, ServiceRegistry, ServiceWatcher};
pub use events::{UserState, UserStateMessage};
pub use kafka::{build_kafka_consumer, build_kafka_producer, topics};
pub use service_names::*;
pub use session::{RedisSessionStore, Session, SessionStore};
