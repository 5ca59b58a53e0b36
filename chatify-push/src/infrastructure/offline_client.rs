//! Offline 服务 gRPC 客户端

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tonic::Request;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use chatify_proto::BaseMessage;
use chatify_proto::offline::v1::offline_service_client::OfflineServiceClient;
use chatify_proto::offline::v1::{
    AcknowledgeMessagesRequest, ArchiveMessagesRequest, RetrieveOfflineMessagesRequest,
};

use crate::config::PushConfig;
use crate::domain::repositories::OfflineRepository;

pub struct OfflineGrpcClient {
    endpoint: String,
    request_timeout: Duration,
    connect_timeout: Duration,
    client: Mutex<Option<OfflineServiceClient<Channel>>>,
}

impl OfflineGrpcClient {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            endpoint: config.offline_endpoint.clone(),
            request_timeout: Duration::from_millis(config.dispatch_timeout_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            client: Mutex::new(None),
        }
    }

    async fn ensure_client(&self) -> Result<OfflineServiceClient<Channel>> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let addr = self
            .endpoint
            .strip_prefix("grpc://")
            .unwrap_or(self.endpoint.as_str());
        let endpoint = Endpoint::from_shared(format!("http://{addr}"))
            .context("invalid offline endpoint")?
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout);
        let client = OfflineServiceClient::new(endpoint.connect_lazy());
        *guard = Some(client.clone());
        debug!(endpoint = %self.endpoint, "offline service client initialized");
        Ok(client)
    }
}

#[async_trait]
impl OfflineRepository for OfflineGrpcClient {
    async fn archive_messages(&self, task_id: &str, messages: &[BaseMessage]) -> Result<()> {
        let mut client = self.ensure_client().await?;
        client
            .archive_messages(Request::new(ArchiveMessagesRequest {
                task_id: task_id.to_string(),
                message: messages.to_vec(),
            }))
            .await
            .context("archive messages rpc failed")?;
        Ok(())
    }

    async fn retrieve_offline_messages(
        &self,
        user_id: &str,
        last_message_id: &str,
    ) -> Result<Vec<BaseMessage>> {
        let mut client = self.ensure_client().await?;
        let response = client
            .retrieve_offline_messages(Request::new(RetrieveOfflineMessagesRequest {
                user_id: user_id.to_string(),
                last_message_id: last_message_id.to_string(),
            }))
            .await
            .context("retrieve offline messages rpc failed")?
            .into_inner();
        Ok(response.message)
    }

    async fn acknowledge_messages(&self, user_id: &str, message_ids: &[String]) -> Result<()> {
        let mut client = self.ensure_client().await?;
        client
            .acknowledge_messages(Request::new(AcknowledgeMessagesRequest {
                user_id: user_id.to_string(),
                message_ids: message_ids.to_vec(),
            }))
            .await
            .context("acknowledge messages rpc failed")?;
        Ok(())
    }
}
