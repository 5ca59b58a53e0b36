//! 推送任务 gRPC 接口

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::debug;

use chatify_proto::push::v1::push_service_server::{PushService, PushServiceServer};
use chatify_proto::push::v1::{PushRequest, PushResponse};

use crate::domain::service::PushDomainService;

#[derive(Clone)]
pub struct PushGrpcHandler {
    service: Arc<PushDomainService>,
}

impl PushGrpcHandler {
    pub fn new(service: Arc<PushDomainService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl PushService for PushGrpcHandler {
    async fn push_to_user(
        &self,
        request: Request<PushRequest>,
    ) -> Result<Response<PushResponse>, Status> {
        let req = request.into_inner();
        if req.task_id.is_empty() {
            return Err(Status::invalid_argument("task_id is required"));
        }
        debug!(task_id = %req.task_id, count = req.message.len(), "push request received");

        self.service
            .push_to_user(&req.task_id, req.message)
            .await
            .map_err(|err| err.to_status())?;

        Ok(Response::new(PushResponse {}))
    }
}

pub struct GrpcServer {
    handler: PushGrpcHandler,
    address: SocketAddr,
    token: CancellationToken,
}

impl GrpcServer {
    pub fn new(handler: PushGrpcHandler, address: SocketAddr, token: CancellationToken) -> Self {
        Self {
            handler,
            address,
            token,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let token = self.token.clone();
        Server::builder()
            .add_service(PushServiceServer::new(self.handler.clone()))
            .serve_with_shutdown(self.address, async move { token.cancelled().await })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_support::{
        MemorySessionStore, MockDispatcher, MockMessageRepository, MockOfflineRepository,
        base_message,
    };

    fn handler() -> PushGrpcHandler {
        let service = PushDomainService::new(
            Arc::new(MemorySessionStore::default()),
            Arc::new(MockMessageRepository::default()),
            Arc::new(MockOfflineRepository::default()),
            Arc::new(MockDispatcher::default()),
        );
        PushGrpcHandler::new(Arc::new(service))
    }

    /// 测试：task_id 必填
    #[tokio::test]
    async fn empty_task_id_is_rejected() {
        let status = handler()
            .push_to_user(Request::new(PushRequest {
                task_id: String::new(),
                message: vec![base_message("m1", "u1")],
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    /// 测试：超限任务返回 TOO_MANY_MESSAGES
    #[tokio::test]
    async fn oversized_task_maps_to_invalid_argument() {
        let message = (0..1001)
            .map(|i| base_message(&format!("m{i}"), "u1"))
            .collect();
        let status = handler()
            .push_to_user(Request::new(PushRequest {
                task_id: "t1".to_string(),
                message,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().starts_with("TOO_MANY_MESSAGES"));
    }

    /// 测试：合法任务返回空响应
    #[tokio::test]
    async fn valid_task_returns_ok() {
        let response = handler()
            .push_to_user(Request::new(PushRequest {
                task_id: "t1".to_string(),
                message: vec![base_message("m1", "u1")],
            }))
            .await
            .expect("push to user");
        let _ = response.into_inner();
    }
}
