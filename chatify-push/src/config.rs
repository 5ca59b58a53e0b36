//! Push 服务配置

use chatify_im_core::config::{AppConfig, KafkaClusterConfig};
use chatify_im_core::{service_names, utils};

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub instance_id: String,
    pub grpc_addr: String,
    /// 注册到发现中心的端点，`grpc://host:port`
    pub advertise_endpoint: String,
    pub redis_url: String,
    pub postgres_url: String,
    pub postgres_max_connections: u32,
    pub kafka: KafkaClusterConfig,
    /// user_state 消费者组
    pub consumer_group: String,
    /// offline 服务端点
    pub offline_endpoint: String,
    pub etcd_endpoints: Vec<String>,
    pub lease_ttl_seconds: i64,
    /// 节点目录兜底刷新周期（秒）
    pub directory_sweep_seconds: u64,
    pub dispatch_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl PushConfig {
    pub fn from_app_config(app: &AppConfig) -> Self {
        let instance_id = app
            .service
            .instance_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| utils::new_instance_id(service_names::PUSH));
        let advertise_endpoint = app
            .push
            .advertise_endpoint
            .clone()
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or_else(|| format!("grpc://{}", app.push.grpc_addr));
        Self {
            instance_id,
            grpc_addr: app.push.grpc_addr.clone(),
            advertise_endpoint,
            redis_url: app.redis.url.clone(),
            postgres_url: app.postgres.url.clone(),
            postgres_max_connections: app.postgres.max_connections,
            kafka: app.kafka.clone(),
            consumer_group: app.push.consumer_group.clone(),
            offline_endpoint: app.push.offline_endpoint.clone(),
            etcd_endpoints: app.etcd.endpoints.clone(),
            lease_ttl_seconds: app.etcd.lease_ttl_seconds,
            directory_sweep_seconds: app.push.directory_sweep_seconds,
            dispatch_timeout_ms: app.push.dispatch_timeout_ms,
            connect_timeout_ms: app.push.connect_timeout_ms,
        }
    }
}
