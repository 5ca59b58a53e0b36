//! 领域接口

use anyhow::Result;
use async_trait::async_trait;

use chatify_proto::BaseMessage;

use super::model::{PersistedMessage, StatusUpdate};

/// 记账行存储
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 批量写入；按 msg_id 幂等，重试不产生重复行
    async fn save_messages(&self, messages: &[PersistedMessage]) -> Result<()>;
    /// 按 msg_id 批量更新状态
    async fn update_message_statuses(&self, updates: &[StatusUpdate]) -> Result<()>;
}

/// 离线消息存储（外部协作方）
#[async_trait]
pub trait OfflineRepository: Send + Sync {
    async fn archive_messages(&self, task_id: &str, messages: &[BaseMessage]) -> Result<()>;
    /// 按用户分页取回未送达消息；last_message_id 为上一页末尾，首页传空
    async fn retrieve_offline_messages(
        &self,
        user_id: &str,
        last_message_id: &str,
    ) -> Result<Vec<BaseMessage>>;
    async fn acknowledge_messages(&self, user_id: &str, message_ids: &[String]) -> Result<()>;
}

/// 向 access 节点投递一批消息
///
/// 返回已进入目标队列的 msg_id 子集；部分成功不算错误。传输失败、
/// 节点未知、节点明确全部拒绝时返回错误，调用方保持各消息的失败原因。
#[async_trait]
pub trait AccessDispatcher: Send + Sync {
    async fn send_to_connection(
        &self,
        connection_id: &str,
        messages: Vec<BaseMessage>,
    ) -> Result<Vec<String>>;
}
