//! 离线消息回放
//!
//! 消费 `user_state`：上线事件触发按页回放，下线事件无事可做。
//! 事件先按 id 去重；归档排除已送达、msg_id 单用户全序、确认按 id
//! 幂等，三者合起来保证带游标的循环在崩溃与重复事件下都安全。

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use chatify_im_core::dedup::DedupStore;
use chatify_im_core::events::{UserState, UserStateMessage};

use super::model::REPLAY_PAGE_SIZE;
use super::repositories::{AccessDispatcher, OfflineRepository};

pub struct PresenceReplayService {
    dedup: Arc<dyn DedupStore>,
    offline: Arc<dyn OfflineRepository>,
    dispatcher: Arc<dyn AccessDispatcher>,
}

impl PresenceReplayService {
    pub fn new(
        dedup: Arc<dyn DedupStore>,
        offline: Arc<dyn OfflineRepository>,
        dispatcher: Arc<dyn AccessDispatcher>,
    ) -> Self {
        Self {
            dedup,
            offline,
            dispatcher,
        }
    }

    pub async fn handle_event(&self, event: UserStateMessage) -> Result<()> {
        if !self
            .dedup
            .check_and_set(&event.id)
            .await
            .context("dedup check failed")?
        {
            debug!(event_id = %event.id, user_id = %event.user_id, "duplicate user state event");
            return Ok(());
        }
        match event.state {
            // 下线时边缘节点已删除会话，无需处理
            UserState::Offline => Ok(()),
            UserState::Online => self.replay(&event).await,
        }
    }

    async fn replay(&self, event: &UserStateMessage) -> Result<()> {
        let mut cursor = String::new();
        loop {
            let page = self
                .offline
                .retrieve_offline_messages(&event.user_id, &cursor)
                .await
                .context("retrieve offline messages failed")?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            let last_msg_id = page
                .last()
                .map(|message| message.msg_id.clone())
                .unwrap_or_default();

            let success_ids = self
                .dispatcher
                .send_to_connection(&event.connection_id, page)
                .await
                .context("replay dispatch failed")?;
            self.offline
                .acknowledge_messages(&event.user_id, &success_ids)
                .await
                .context("acknowledge messages failed")?;

            info!(
                user_id = %event.user_id,
                count = page_len,
                delivered = success_ids.len(),
                "offline messages replayed"
            );
            if page_len < REPLAY_PAGE_SIZE {
                break;
            }
            cursor = last_msg_id;
        }
        Ok(())
    }
}
