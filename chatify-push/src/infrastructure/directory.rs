//! Access 节点目录
//!
//! 维护 connection_id 到 gRPC 客户端的映射。watch 事件只触发快照刷新，
//! 剔除一律以完整快照为准，丢一条事件最多延迟一个兜底周期（30 秒）。
//! 客户端懒连接，目录查询永不阻塞在网络上。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tonic::Request;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use chatify_im_core::discovery::ServiceWatcher;
use chatify_proto::BaseMessage;
use chatify_proto::access::v1::access_service_client::AccessServiceClient;
use chatify_proto::access::v1::push_message_response::Code;
use chatify_proto::access::v1::PushMessageRequest;

use crate::config::PushConfig;
use crate::domain::repositories::AccessDispatcher;

/// watch 断开后的重试间隔
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct AccessDirectory {
    clients: RwLock<HashMap<String, AccessServiceClient<Channel>>>,
    watcher: ServiceWatcher,
    sweep_interval: Duration,
    request_timeout: Duration,
    connect_timeout: Duration,
    token: CancellationToken,
}

impl AccessDirectory {
    pub fn new(watcher: ServiceWatcher, config: &PushConfig, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            watcher,
            sweep_interval: Duration::from_secs(config.directory_sweep_seconds.max(1)),
            request_timeout: Duration::from_millis(config.dispatch_timeout_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            token,
        })
    }

    /// 初始同步并启动 watch 与兜底刷新任务
    pub async fn start(self: Arc<Self>) -> Result<()> {
        self.resync()
            .await
            .context("initial access directory sync failed")?;
        {
            let directory = Arc::clone(&self);
            tokio::spawn(async move { directory.watch_loop().await });
        }
        {
            let directory = Arc::clone(&self);
            tokio::spawn(async move { directory.sweep_loop().await });
        }
        info!("access directory started");
        Ok(())
    }

    async fn watch_loop(&self) {
        loop {
            if self.token.is_cancelled() {
                return;
            }
            let (mut watcher, mut stream) = match self.watcher.watch().await {
                Ok(watching) => watching,
                Err(err) => {
                    warn!(error = %err, "watch access instances failed");
                    tokio::time::sleep(WATCH_RETRY_DELAY).await;
                    continue;
                }
            };
            loop {
                tokio::select! {
                    _ = self.token.cancelled() => {
                        let _ = watcher.cancel().await;
                        return;
                    }
                    message = stream.message() => match message {
                        Ok(Some(_event)) => {
                            if let Err(err) = self.resync().await {
                                warn!(error = %err, "directory resync failed");
                            }
                        }
                        Ok(None) => {
                            warn!("access watch stream closed");
                            break;
                        }
                        Err(err) => {
                            warn!(error = %err, "access watch stream error");
                            break;
                        }
                    }
                }
            }
            tokio::time::sleep(WATCH_RETRY_DELAY).await;
        }
    }

    /// 周期性全量刷新，为事件丢失兜底
    async fn sweep_loop(&self) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(err) = self.resync().await {
                        warn!(error = %err, "directory sweep failed");
                    }
                }
            }
        }
    }

    async fn resync(&self) -> Result<()> {
        let instances = self.watcher.snapshot().await?;
        let live: HashSet<String> = instances.iter().map(|i| i.id.clone()).collect();

        // 建连在持锁段外完成，锁内只做插入与剔除
        let mut fresh: Vec<(String, AccessServiceClient<Channel>)> = Vec::new();
        {
            let known = self.clients.read().await;
            for instance in &instances {
                if known.contains_key(&instance.id) {
                    continue;
                }
                let Some(uri) = instance.http_uri() else {
                    warn!(id = %instance.id, "access instance has no grpc endpoint");
                    continue;
                };
                match self.dial(&uri) {
                    Ok(client) => fresh.push((instance.id.clone(), client)),
                    Err(err) => {
                        warn!(id = %instance.id, uri = %uri, error = %err, "dial access node failed")
                    }
                }
            }
        }

        let mut clients = self.clients.write().await;
        for (id, client) in fresh {
            clients.entry(id).or_insert(client);
        }
        clients.retain(|id, _| live.contains(id));
        debug!(count = clients.len(), "access directory refreshed");
        Ok(())
    }

    fn dial(&self, uri: &str) -> Result<AccessServiceClient<Channel>> {
        let endpoint = Endpoint::from_shared(uri.to_string())
            .context("invalid access endpoint")?
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(Some(Duration::from_secs(30)));
        Ok(AccessServiceClient::new(endpoint.connect_lazy()))
    }

    /// 查询某节点的客户端；只读本地表，不触网
    pub async fn get_client(&self, connection_id: &str) -> Option<AccessServiceClient<Channel>> {
        self.clients.read().await.get(connection_id).cloned()
    }

    pub async fn close(&self) {
        self.clients.write().await.clear();
    }
}

#[async_trait]
impl AccessDispatcher for AccessDirectory {
    async fn send_to_connection(
        &self,
        connection_id: &str,
        messages: Vec<BaseMessage>,
    ) -> Result<Vec<String>> {
        let Some(mut client) = self.get_client(connection_id).await else {
            bail!("access node not found: {connection_id}");
        };
        let response = client
            .push_message(Request::new(PushMessageRequest {
                connection_id: connection_id.to_string(),
                message: messages,
            }))
            .await
            .with_context(|| format!("failed to call access node {connection_id}"))?
            .into_inner();
        match Code::try_from(response.code) {
            Ok(Code::AllFailed) => {
                bail!("access node rejected all messages: {}", response.message)
            }
            // 全部成功与部分成功都以返回的子集为准
            _ => Ok(response.success_message_ids),
        }
    }
}
