//! 用户状态事件
//!
//! access 节点在会话建立/销毁时发布到 `user_state` 主题，push 服务
//! 消费并触发离线消息回放。JSON 编码，事件 `id` 作为分区键与去重键。

use serde::{Deserialize, Serialize};

use crate::utils;

/// 用户在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Online,
    Offline,
}

/// 用户状态消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStateMessage {
    /// 事件 ID，全局唯一，消费端按它去重
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub state: UserState,
    pub connection_time: i64,
    pub connection_id: String,
}

impl UserStateMessage {
    pub fn online(
        user_id: &str,
        user_name: &str,
        connection_time: i64,
        connection_id: &str,
    ) -> Self {
        Self::new(user_id, user_name, UserState::Online, connection_time, connection_id)
    }

    pub fn offline(
        user_id: &str,
        user_name: &str,
        connection_time: i64,
        connection_id: &str,
    ) -> Self {
        Self::new(user_id, user_name, UserState::Offline, connection_time, connection_id)
    }

    fn new(
        user_id: &str,
        user_name: &str,
        state: UserState,
        connection_time: i64,
        connection_id: &str,
    ) -> Self {
        Self {
            id: utils::new_event_id(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            state,
            connection_time,
            connection_id: connection_id.to_string(),
        }
    }
}
