//! WebSocket 接入
//!
//! 升级路径 `/chatify/access/v1/ws`，身份头 `x-user-id` / `x-user-name`
//! 由外部认证方写入；缺失即拒绝升级。升级失败只影响该连接。

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AccessConfig;
use crate::domain::manager::{ConnectionManager, READ_LIMIT_BYTES};
use crate::domain::model::ClientIdentity;

/// 升级路径
pub const WS_PATH: &str = "/chatify/access/v1/ws";
/// 认证方写入的用户 ID 头
pub const HEADER_USER_ID: &str = "x-user-id";
/// 认证方写入的用户名头
pub const HEADER_USER_NAME: &str = "x-user-name";

pub struct WsListener {
    config: Arc<AccessConfig>,
    manager: Arc<ConnectionManager>,
    token: CancellationToken,
}

impl WsListener {
    pub fn new(
        config: Arc<AccessConfig>,
        manager: Arc<ConnectionManager>,
        token: CancellationToken,
    ) -> Self {
        Self {
            config,
            manager,
            token,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.ws_addr)
            .await
            .with_context(|| format!("failed to bind websocket listener {}", self.config.ws_addr))?;
        info!(addr = %self.config.ws_addr, "WebSocket listener started");

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %err, "accept connection failed");
                            continue;
                        }
                    };
                    let manager = self.manager.clone();
                    let token = self.token.clone();
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, peer, manager, token).await {
                            debug!(peer = %peer, error = %err, "connection closed");
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    manager: Arc<ConnectionManager>,
    token: CancellationToken,
) -> Result<()> {
    let mut identity: Option<ClientIdentity> = None;
    let callback = |req: &Request, response: Response| {
        if req.uri().path() != WS_PATH {
            return Err(error_response(StatusCode::NOT_FOUND, "not found"));
        }
        let user_id = header_value(req, HEADER_USER_ID);
        let user_name = header_value(req, HEADER_USER_NAME);
        match (user_id, user_name) {
            (Some(user_id), Some(user_name)) if !user_id.is_empty() => {
                identity = Some(ClientIdentity { user_id, user_name });
                Ok(response)
            }
            _ => Err(error_response(
                StatusCode::UNAUTHORIZED,
                "missing identity headers",
            )),
        }
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(READ_LIMIT_BYTES);
    ws_config.max_frame_size = Some(READ_LIMIT_BYTES);

    let ws = accept_hdr_async_with_config(stream, callback, Some(ws_config))
        .await
        .context("websocket upgrade failed")?;
    let identity = identity.context("identity missing after upgrade")?;
    debug!(peer = %peer, user_id = %identity.user_id, "client connected");

    manager.start_client(ws, identity, &token).await;
    Ok(())
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn error_response(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
