//! 上行消息分发
//!
//! 客户端帧是 JSON 编码的 BaseMessage。解码后按消息类型路由主题：
//! DATAREPORT 走 `data_report`，其余走 `user_message`，key 一律为 msg_id。

use std::sync::Arc;

use async_trait::async_trait;

use chatify_im_core::kafka::topics;
use chatify_proto::{BaseMessage, MessageType};

use crate::domain::repositories::{DispatchError, EventPublisher, UpstreamDispatcher};

pub struct MessageDispatcher {
    publisher: Arc<dyn EventPublisher>,
}

impl MessageDispatcher {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl UpstreamDispatcher for MessageDispatcher {
    async fn dispatch(&self, user_id: &str, payload: &[u8]) -> Result<(), DispatchError> {
        let mut message: BaseMessage = serde_json::from_slice(payload)
            .map_err(|err| DispatchError::Malformed(format!("invalid message: {err}")))?;
        if message.msg_id.is_empty() {
            return Err(DispatchError::Malformed("msg_id is required".to_string()));
        }
        // 发送方身份以连接为准，不信任帧内内容
        message.from_user_id = user_id.to_string();

        let topic = if message.message_type == MessageType::Datareport as i32 {
            topics::DATA_REPORT
        } else {
            topics::USER_MESSAGE
        };
        let bytes = serde_json::to_vec(&message)
            .map_err(|err| DispatchError::Publish(err.into()))?;
        self.publisher
            .publish(topic, &message.msg_id, bytes)
            .await
            .map_err(DispatchError::Publish)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingPublisher;

    fn dispatcher() -> (MessageDispatcher, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        (MessageDispatcher::new(publisher.clone()), publisher)
    }

    /// 测试：聊天消息进入 user_message，key 为 msg_id
    #[tokio::test]
    async fn chat_message_goes_to_user_message_topic() {
        let (dispatcher, publisher) = dispatcher();
        let payload = serde_json::json!({
            "msg_id": "m1",
            "message_type": MessageType::Chat as i32,
            "to_user_id": "u2",
        })
        .to_string();

        dispatcher.dispatch("u1", payload.as_bytes()).await.expect("dispatch");

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let (topic, key, bytes) = &published[0];
        assert_eq!(topic, topics::USER_MESSAGE);
        assert_eq!(key, "m1");
        let sent: BaseMessage = serde_json::from_slice(bytes).expect("decode published");
        // 发送方被改写为连接身份
        assert_eq!(sent.from_user_id, "u1");
    }

    /// 测试：数据上报消息路由到 data_report
    #[tokio::test]
    async fn datareport_goes_to_data_report_topic() {
        let (dispatcher, publisher) = dispatcher();
        let payload = serde_json::json!({
            "msg_id": "m2",
            "message_type": MessageType::Datareport as i32,
        })
        .to_string();

        dispatcher.dispatch("u1", payload.as_bytes()).await.expect("dispatch");

        let published = publisher.published.lock().unwrap();
        assert_eq!(published[0].0, topics::DATA_REPORT);
    }

    /// 测试：非 JSON 帧判为 Malformed
    #[tokio::test]
    async fn invalid_json_is_malformed() {
        let (dispatcher, publisher) = dispatcher();
        let err = dispatcher.dispatch("u1", b"{oops").await.unwrap_err();
        assert!(matches!(err, DispatchError::Malformed(_)));
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    /// 测试：缺少 msg_id 的消息被拒绝
    #[tokio::test]
    async fn missing_msg_id_is_malformed() {
        let (dispatcher, _publisher) = dispatcher();
        let err = dispatcher.dispatch("u1", b"{}").await.unwrap_err();
        assert!(matches!(err, DispatchError::Malformed(_)));
    }
}
