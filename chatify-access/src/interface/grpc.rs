//! 下行推送 gRPC 接口
//!
//! push 服务按 connection_id 把消息路由到持有目标连接的节点。部分失败
//! 不走错误码，由返回的 success_message_ids 子集表达。

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use chatify_proto::access::v1::access_service_server::{AccessService, AccessServiceServer};
use chatify_proto::access::v1::push_message_response::Code;
use chatify_proto::access::v1::{PushMessageRequest, PushMessageResponse};

use crate::domain::manager::ConnectionManager;
use crate::domain::model::SendOutcome;

#[derive(Clone)]
pub struct AccessGrpcHandler {
    manager: Arc<ConnectionManager>,
}

impl AccessGrpcHandler {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[tonic::async_trait]
impl AccessService for AccessGrpcHandler {
    async fn push_message(
        &self,
        request: Request<PushMessageRequest>,
    ) -> Result<Response<PushMessageResponse>, Status> {
        let req = request.into_inner();
        if req.connection_id != self.manager.node_id() {
            warn!(
                connection_id = %req.connection_id,
                node_id = %self.manager.node_id(),
                "push message for unknown connection"
            );
            return Err(Status::invalid_argument("unknown connection id"));
        }

        let total = req.message.len();
        let mut success_message_ids = Vec::with_capacity(total);
        for message in req.message {
            if message.to_user_id.is_empty() {
                continue;
            }
            let payload = serde_json::to_string(&message)
                .map_err(|err| Status::internal(format!("encode message: {err}")))?;
            // 入队即成功；队列满被丢弃、用户不在本节点都算失败
            if self.manager.try_send_to_user(&message.to_user_id, payload).await
                == SendOutcome::Queued
            {
                success_message_ids.push(message.msg_id);
            }
        }

        let code = if success_message_ids.len() == total {
            Code::AllSuccess
        } else if success_message_ids.is_empty() {
            Code::AllFailed
        } else {
            Code::PartialFailed
        };
        debug!(total, success = success_message_ids.len(), "push message handled");

        Ok(Response::new(PushMessageResponse {
            code: code as i32,
            message: match code {
                Code::AllSuccess => "success".to_string(),
                Code::PartialFailed => "partial failed".to_string(),
                Code::AllFailed => "all failed".to_string(),
            },
            success_message_ids,
        }))
    }
}

pub struct GrpcServer {
    handler: AccessGrpcHandler,
    address: SocketAddr,
    token: CancellationToken,
}

impl GrpcServer {
    pub fn new(handler: AccessGrpcHandler, address: SocketAddr, token: CancellationToken) -> Self {
        Self {
            handler,
            address,
            token,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let token = self.token.clone();
        Server::builder()
            .add_service(AccessServiceServer::new(self.handler.clone()))
            .serve_with_shutdown(self.address, async move { token.cancelled().await })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatify_proto::BaseMessage;

    use crate::domain::manager::SEND_QUEUE_CAPACITY;
    use crate::test_support::test_manager;

    fn base_message(msg_id: &str, to_user_id: &str) -> BaseMessage {
        BaseMessage {
            msg_id: msg_id.to_string(),
            to_user_id: to_user_id.to_string(),
            ..Default::default()
        }
    }

    /// 测试：目标节点不符返回 unknown connection id
    #[tokio::test]
    async fn rejects_unknown_connection_id() {
        let handler = AccessGrpcHandler::new(test_manager("n1"));
        let status = handler
            .push_message(Request::new(PushMessageRequest {
                connection_id: "n2".to_string(),
                message: vec![base_message("m1", "u1")],
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("unknown connection id"));
    }

    /// 测试：全部入队成功（S1 的 access 侧）
    #[tokio::test]
    async fn all_success_returns_every_id() {
        let manager = test_manager("n1");
        let (_rx, _cancel) = manager.register_test_client("u1", SEND_QUEUE_CAPACITY).await;
        let handler = AccessGrpcHandler::new(manager);

        let resp = handler
            .push_message(Request::new(PushMessageRequest {
                connection_id: "n1".to_string(),
                message: vec![base_message("m1", "u1"), base_message("m2", "u1")],
            }))
            .await
            .expect("push message")
            .into_inner();

        assert_eq!(resp.code, Code::AllSuccess as i32);
        assert_eq!(resp.success_message_ids, vec!["m1", "m2"]);
    }

    /// 测试：部分用户不在本节点时返回成功子集
    #[tokio::test]
    async fn partial_success_returns_subset() {
        let manager = test_manager("n1");
        let (_rx, _cancel) = manager.register_test_client("u1", SEND_QUEUE_CAPACITY).await;
        let handler = AccessGrpcHandler::new(manager);

        let resp = handler
            .push_message(Request::new(PushMessageRequest {
                connection_id: "n1".to_string(),
                message: vec![base_message("m1", "u1"), base_message("m2", "u-gone")],
            }))
            .await
            .expect("push message")
            .into_inner();

        assert_eq!(resp.code, Code::PartialFailed as i32);
        assert_eq!(resp.success_message_ids, vec!["m1"]);
    }

    /// 测试：队列满被丢弃的消息不进成功集（S6）
    #[tokio::test]
    async fn dropped_message_is_not_successful() {
        let manager = test_manager("n1");
        let (_rx, _cancel) = manager.register_test_client("u5", 1).await;
        let handler = AccessGrpcHandler::new(manager);

        let resp = handler
            .push_message(Request::new(PushMessageRequest {
                connection_id: "n1".to_string(),
                message: vec![base_message("m1", "u5"), base_message("m6", "u5")],
            }))
            .await
            .expect("push message")
            .into_inner();

        // 容量 1：第一条入队，第二条被丢弃
        assert_eq!(resp.success_message_ids, vec!["m1"]);
        assert_eq!(resp.code, Code::PartialFailed as i32);
    }

    /// 测试：全部失败
    #[tokio::test]
    async fn all_failed_when_no_target_connected() {
        let handler = AccessGrpcHandler::new(test_manager("n1"));
        let resp = handler
            .push_message(Request::new(PushMessageRequest {
                connection_id: "n1".to_string(),
                message: vec![base_message("m1", "u-gone")],
            }))
            .await
            .expect("push message")
            .into_inner();
        assert_eq!(resp.code, Code::AllFailed as i32);
        assert!(resp.success_message_ids.is_empty());
    }
}
