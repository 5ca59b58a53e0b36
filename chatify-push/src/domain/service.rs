//! 推送路由核心流程
//!
//! 步骤顺序是正确性的一部分：先落 PENDING 意图，再分类分组、分发、
//! 归档离线，最后结清状态。任何记账步骤失败都让整个任务报错，调用方
//! 整体重试；msg_id 幂等保证重试安全。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use chatify_im_core::session::SessionStore;
use chatify_proto::BaseMessage;

use crate::error::PushError;

use super::model::{DeliveryFailure, MessageStatus, PersistedMessage, StatusUpdate};
use super::model::MAX_TASK_MESSAGES;
use super::repositories::{AccessDispatcher, MessageRepository, OfflineRepository};

pub struct PushDomainService {
    session: Arc<dyn SessionStore>,
    messages: Arc<dyn MessageRepository>,
    offline: Arc<dyn OfflineRepository>,
    dispatcher: Arc<dyn AccessDispatcher>,
}

impl PushDomainService {
    pub fn new(
        session: Arc<dyn SessionStore>,
        messages: Arc<dyn MessageRepository>,
        offline: Arc<dyn OfflineRepository>,
        dispatcher: Arc<dyn AccessDispatcher>,
    ) -> Self {
        Self {
            session,
            messages,
            offline,
            dispatcher,
        }
    }

    pub async fn push_to_user(
        &self,
        task_id: &str,
        messages: Vec<BaseMessage>,
    ) -> Result<(), PushError> {
        // 1. 入口校验
        if messages.len() > MAX_TASK_MESSAGES {
            warn!(
                task_id,
                count = messages.len(),
                max = MAX_TASK_MESSAGES,
                "push task exceeds message cap"
            );
            return Err(PushError::TooManyMessages {
                count: messages.len(),
                max: MAX_TASK_MESSAGES,
            });
        }
        debug!(task_id, count = messages.len(), "push task received");

        // 2. 先落意图：分发之前每条消息必须有 PENDING 行，
        //    进程中途崩溃时不会留下无账可查的消息
        let rows: Vec<PersistedMessage> = messages
            .iter()
            .map(|message| PersistedMessage::pending(message, task_id))
            .collect();
        self.messages
            .save_messages(&rows)
            .await
            .map_err(PushError::SaveMessageFailed)?;

        // 3. 分类分组；失败是保守默认值，只有被节点确认的消息才翻成功
        let mut reasons: HashMap<String, DeliveryFailure> = messages
            .iter()
            .map(|message| (message.msg_id.clone(), DeliveryFailure::SendFailed))
            .collect();
        let mut groups: HashMap<String, Vec<BaseMessage>> = HashMap::new();
        for message in &messages {
            if message.to_user_id.is_empty() {
                reasons.insert(message.msg_id.clone(), DeliveryFailure::UserInvalid);
                continue;
            }
            match self.session.get_session(&message.to_user_id).await {
                Err(err) => {
                    warn!(
                        task_id,
                        to_user_id = %message.to_user_id,
                        error = %err,
                        "session lookup failed"
                    );
                    reasons.insert(message.msg_id.clone(), DeliveryFailure::SessionError);
                }
                Ok(None) => {
                    reasons.insert(message.msg_id.clone(), DeliveryFailure::UserOffline);
                }
                Ok(Some(session)) if session.connection_id.is_empty() => {
                    reasons.insert(message.msg_id.clone(), DeliveryFailure::UserOffline);
                }
                Ok(Some(session)) => {
                    groups
                        .entry(session.connection_id)
                        .or_default()
                        .push(message.clone());
                }
            }
        }

        // 4. 每个目标节点恰好调用一次；成功子集为准，陌生 ID 不予采信
        for (connection_id, group) in groups {
            let requested: HashSet<String> =
                group.iter().map(|message| message.msg_id.clone()).collect();
            match self.dispatcher.send_to_connection(&connection_id, group).await {
                Ok(success_ids) => {
                    for msg_id in success_ids {
                        if requested.contains(&msg_id) {
                            reasons.remove(&msg_id);
                        } else {
                            warn!(
                                task_id,
                                connection_id = %connection_id,
                                msg_id = %msg_id,
                                "ignore unknown id in success set"
                            );
                        }
                    }
                }
                Err(err) => {
                    // 会话可能引用了已死节点；此时消息不归档，留在
                    // PENDING/send failed 等待上游重试或对账
                    warn!(
                        task_id,
                        connection_id = %connection_id,
                        error = %err,
                        "dispatch to access node failed"
                    );
                }
            }
        }

        // 5. 离线消息整批归档，先于状态结清
        let offline_messages: Vec<BaseMessage> = messages
            .iter()
            .filter(|message| {
                reasons.get(&message.msg_id) == Some(&DeliveryFailure::UserOffline)
            })
            .cloned()
            .collect();
        if !offline_messages.is_empty() {
            self.offline
                .archive_messages(task_id, &offline_messages)
                .await
                .map_err(PushError::ArchiveOfflineMessageFailed)?;
        }

        // 6. 结清状态
        let updates: Vec<StatusUpdate> = messages
            .iter()
            .map(|message| match reasons.get(&message.msg_id) {
                None => StatusUpdate {
                    msg_id: message.msg_id.clone(),
                    status: MessageStatus::Sent,
                    description: String::new(),
                },
                Some(failure) => StatusUpdate {
                    msg_id: message.msg_id.clone(),
                    status: MessageStatus::Pending,
                    description: failure.description().to_string(),
                },
            })
            .collect();
        self.messages
            .update_message_statuses(&updates)
            .await
            .map_err(PushError::UpdateMessageStatusFailed)?;

        info!(
            task_id,
            count = messages.len(),
            offline = offline_messages.len(),
            "push task completed"
        );
        Ok(())
    }
}
