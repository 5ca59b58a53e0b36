//! 推送域模型

use chatify_proto::BaseMessage;
use uuid::Uuid;

/// 单任务消息数上限，入口硬性校验
pub const MAX_TASK_MESSAGES: usize = 1000;
/// 离线回放单页上限
pub const REPLAY_PAGE_SIZE: usize = 1000;
/// 落库批大小
pub const INSERT_BATCH_SIZE: usize = 100;

/// 消息记账状态
///
/// SENT 是唯一的终态：消息已进入收件人所在节点的发送队列。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Sent,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
        }
    }
}

/// 单条消息未送达的原因，写入记账行的 description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryFailure {
    SendFailed,
    SessionError,
    UserOffline,
    UserInvalid,
}

impl DeliveryFailure {
    pub fn description(&self) -> &'static str {
        match self {
            DeliveryFailure::SendFailed => "send failed",
            DeliveryFailure::SessionError => "session status error",
            DeliveryFailure::UserOffline => "user offline",
            DeliveryFailure::UserInvalid => "user invalid",
        }
    }
}

/// 推送任务的记账行，每条输入消息一行
#[derive(Debug, Clone)]
pub struct PersistedMessage {
    pub id: String,
    pub msg_id: String,
    pub message_type: i32,
    pub from_user_id: String,
    pub target_type: i32,
    pub to_user_id: String,
    pub content: Vec<u8>,
    pub timestamp: i64,
    pub expire_time: i64,
    pub content_id: String,
    pub task_id: String,
    pub status: MessageStatus,
    pub description: String,
}

impl PersistedMessage {
    /// 以 PENDING 状态生成记账行；任何投递动作之前必须先落这份意图
    pub fn pending(message: &BaseMessage, task_id: &str) -> Self {
        Self {
            id: format!("pmid{}", Uuid::new_v4().simple()),
            msg_id: message.msg_id.clone(),
            message_type: message.message_type,
            from_user_id: message.from_user_id.clone(),
            target_type: message.target_type,
            to_user_id: message.to_user_id.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            expire_time: message.expire_time,
            content_id: message.content_id.clone(),
            task_id: task_id.to_string(),
            status: MessageStatus::Pending,
            description: String::new(),
        }
    }
}

/// 按 msg_id 寻址的状态更新，天然幂等
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub msg_id: String,
    pub status: MessageStatus,
    pub description: String,
}
