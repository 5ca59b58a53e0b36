//! Push 服务错误
//!
//! 分类性失败（用户无效、离线等）按消息吸收进记账描述，不进错误类型；
//! 这里只定义让整个任务失败、需要调用方重试的错误。

use thiserror::Error;
use tonic::Status;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("TOO_MANY_MESSAGES: count={count}, max={max}")]
    TooManyMessages { count: usize, max: usize },
    #[error("SAVE_MESSAGE_FAILED: {0:#}")]
    SaveMessageFailed(anyhow::Error),
    #[error("ARCHIVE_OFFLINE_MESSAGE_FAILED: {0:#}")]
    ArchiveOfflineMessageFailed(anyhow::Error),
    #[error("UPDATE_MESSAGE_STATUS_FAILED: {0:#}")]
    UpdateMessageStatusFailed(anyhow::Error),
}

impl PushError {
    /// 映射到 gRPC 状态；入口校验失败用 InvalidArgument，
    /// 记账失败用 Internal，重试由上游去重保证安全。
    pub fn to_status(&self) -> Status {
        match self {
            PushError::TooManyMessages { .. } => Status::invalid_argument(self.to_string()),
            PushError::SaveMessageFailed(_)
            | PushError::ArchiveOfflineMessageFailed(_)
            | PushError::UpdateMessageStatusFailed(_) => Status::internal(self.to_string()),
        }
    }
}
