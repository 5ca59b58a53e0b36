//! 服务注册发现
//!
//! 基于 etcd：实例以 JSON 写入 `/chatify/services/<服务名>/<实例ID>`，
//! 绑定租约并由后台任务续约；消费方通过前缀快照 + watch 感知实例变化。
//! watch 事件只作为刷新触发器，剔除实例一律以完整快照为准。

use std::time::Duration;

use anyhow::{Context, Result};
use etcd_client::{Client, GetOptions, PutOptions, WatchOptions, WatchStream, Watcher};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 注册路径前缀
pub const SERVICE_PREFIX: &str = "/chatify/services";

/// 某服务的注册前缀，末尾带分隔符避免前缀串扰
pub fn service_prefix(name: &str) -> String {
    format!("{SERVICE_PREFIX}/{name}/")
}

/// 单实例的注册键
pub fn instance_key(name: &str, id: &str) -> String {
    format!("{SERVICE_PREFIX}/{name}/{id}")
}

/// 注册中心里的服务实例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// 实例 ID；access 节点的实例 ID 即 connection_id
    pub id: String,
    /// 服务名
    pub name: String,
    /// gRPC 端点，`grpc://host:port`
    pub endpoint: String,
}

impl ServiceInstance {
    /// 解析出 `host:port`
    pub fn grpc_addr(&self) -> Option<&str> {
        if let Some(addr) = self.endpoint.strip_prefix("grpc://") {
            return Some(addr);
        }
        if let Some(addr) = self.endpoint.strip_prefix("http://") {
            return Some(addr);
        }
        if self.endpoint.is_empty() {
            None
        } else {
            Some(self.endpoint.as_str())
        }
    }

    /// tonic 使用的 http URI
    pub fn http_uri(&self) -> Option<String> {
        self.grpc_addr().map(|addr| format!("http://{addr}"))
    }
}

/// 服务注册句柄：持有租约并在后台续约，`deregister` 主动注销
pub struct ServiceRegistry {
    client: Client,
    key: String,
    keepalive: JoinHandle<()>,
}

impl ServiceRegistry {
    /// 注册实例并启动租约续约
    pub async fn register(
        endpoints: &[String],
        instance: &ServiceInstance,
        lease_ttl_seconds: i64,
    ) -> Result<Self> {
        let mut client = Client::connect(endpoints, None)
            .await
            .context("failed to connect to etcd")?;

        let lease = client
            .lease_grant(lease_ttl_seconds, None)
            .await
            .context("failed to grant lease")?;
        let lease_id = lease.id();

        let key = instance_key(&instance.name, &instance.id);
        let value = serde_json::to_string(instance)?;
        client
            .put(key.clone(), value, Some(PutOptions::new().with_lease(lease_id)))
            .await
            .context("failed to register service instance")?;

        let (mut keeper, mut stream) = client
            .lease_keep_alive(lease_id)
            .await
            .context("failed to start lease keepalive")?;
        let period = Duration::from_secs((lease_ttl_seconds as u64 / 3).max(1));
        let keepalive = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if let Err(err) = keeper.keep_alive().await {
                    warn!(error = %err, "lease keepalive send failed");
                    continue;
                }
                match stream.message().await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        warn!("lease keepalive stream closed");
                        return;
                    }
                    Err(err) => warn!(error = %err, "lease keepalive recv failed"),
                }
            }
        });

        info!(name = %instance.name, id = %instance.id, endpoint = %instance.endpoint, "service registered");
        Ok(Self {
            client,
            key,
            keepalive,
        })
    }

    /// 注销实例
    pub async fn deregister(mut self) -> Result<()> {
        self.keepalive.abort();
        self.client
            .delete(self.key.clone(), None)
            .await
            .context("failed to deregister service instance")?;
        info!(key = %self.key, "service deregistered");
        Ok(())
    }
}

impl Drop for ServiceRegistry {
    fn drop(&mut self) {
        self.keepalive.abort();
    }
}

/// 某个服务的发现视图
pub struct ServiceWatcher {
    client: Client,
    name: String,
}

impl ServiceWatcher {
    pub async fn connect(endpoints: &[String], name: &str) -> Result<Self> {
        let client = Client::connect(endpoints, None)
            .await
            .context("failed to connect to etcd")?;
        Ok(Self {
            client,
            name: name.to_string(),
        })
    }

    /// 当前全量实例快照
    pub async fn snapshot(&self) -> Result<Vec<ServiceInstance>> {
        let mut client = self.client.clone();
        let resp = client
            .get(
                service_prefix(&self.name),
                Some(GetOptions::new().with_prefix()),
            )
            .await
            .context("failed to fetch service snapshot")?;
        let mut instances = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            match serde_json::from_slice::<ServiceInstance>(kv.value()) {
                Ok(instance) => instances.push(instance),
                Err(err) => {
                    // 脏数据只跳过，不影响其余实例
                    debug!(error = %err, "skip malformed service instance");
                }
            }
        }
        Ok(instances)
    }

    /// 订阅实例变更；返回的流只用于触发快照刷新
    pub async fn watch(&self) -> Result<(Watcher, WatchStream)> {
        let mut client = self.client.clone();
        client
            .watch(
                service_prefix(&self.name),
                Some(WatchOptions::new().with_prefix()),
            )
            .await
            .context("failed to watch service prefix")
    }
}
