//! Access 服务配置

use chatify_im_core::config::{AppConfig, KafkaClusterConfig};
use chatify_im_core::{service_names, utils};

#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// 实例 ID，即会话表里的 connection_id
    pub instance_id: String,
    /// WebSocket 监听地址
    pub ws_addr: String,
    /// gRPC 监听地址
    pub grpc_addr: String,
    /// 注册到发现中心的端点，`grpc://host:port`
    pub advertise_endpoint: String,
    pub redis_url: String,
    pub kafka: KafkaClusterConfig,
    pub etcd_endpoints: Vec<String>,
    pub lease_ttl_seconds: i64,
}

impl AccessConfig {
    pub fn from_app_config(app: &AppConfig) -> Self {
        let instance_id = app
            .service
            .instance_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| utils::new_instance_id(service_names::ACCESS));
        let advertise_endpoint = app
            .access
            .advertise_endpoint
            .clone()
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or_else(|| format!("grpc://{}", app.access.grpc_addr));
        Self {
            instance_id,
            ws_addr: app.access.ws_addr.clone(),
            grpc_addr: app.access.grpc_addr.clone(),
            advertise_endpoint,
            redis_url: app.redis.url.clone(),
            kafka: app.kafka.clone(),
            etcd_endpoints: app.etcd.endpoints.clone(),
            lease_ttl_seconds: app.etcd.lease_ttl_seconds,
        }
    }
}
