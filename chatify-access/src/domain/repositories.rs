//! 领域接口

use anyhow::Result;
use async_trait::async_trait;

/// 事件发布（user_state / user_message / data_report）
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()>;
}

/// 上行消息分发失败
#[derive(Debug)]
pub enum DispatchError {
    /// 帧内容不是合法消息；回一帧错误提示，连接继续
    Malformed(String),
    /// 事件总线写入失败
    Publish(anyhow::Error),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Malformed(reason) => write!(f, "malformed message: {reason}"),
            DispatchError::Publish(err) => write!(f, "publish failed: {err}"),
        }
    }
}

/// 上行消息入站处理
#[async_trait]
pub trait UpstreamDispatcher: Send + Sync {
    async fn dispatch(&self, user_id: &str, payload: &[u8]) -> Result<(), DispatchError>;
}
