//! user_state 消费者
//!
//! 手动提交位移：处理成功才提交；处理失败不提交，等待 broker 重投。
//! 无法解析的事件属于毒丸，记录后提交跳过。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chatify_im_core::events::UserStateMessage;
use chatify_im_core::kafka::{build_kafka_consumer, topics};

use crate::config::PushConfig;
use crate::domain::replay::PresenceReplayService;

/// 消费出错后的退避
const RECV_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct UserStateConsumer {
    consumer: StreamConsumer,
    group: String,
    replay: Arc<PresenceReplayService>,
    token: CancellationToken,
}

impl UserStateConsumer {
    pub fn new(
        config: &PushConfig,
        replay: Arc<PresenceReplayService>,
        token: CancellationToken,
    ) -> Result<Self> {
        let consumer = build_kafka_consumer(
            &config.kafka,
            &config.consumer_group,
            &[topics::USER_STATE],
        )?;
        Ok(Self {
            consumer,
            group: config.consumer_group.clone(),
            replay,
            token,
        })
    }

    pub async fn run(&self) -> Result<()> {
        info!(
            group = %self.group,
            topic = topics::USER_STATE,
            "user state consumer started"
        );
        loop {
            let record = tokio::select! {
                _ = self.token.cancelled() => break,
                record = self.consumer.recv() => record,
            };
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    error!(error = %err, "kafka recv failed");
                    tokio::time::sleep(RECV_RETRY_DELAY).await;
                    continue;
                }
            };

            let Some(payload) = record.payload() else {
                self.commit(&record);
                continue;
            };
            debug!(
                topic = record.topic(),
                partition = record.partition(),
                offset = record.offset(),
                "user state event received"
            );

            match serde_json::from_slice::<UserStateMessage>(payload) {
                Err(err) => {
                    warn!(error = %err, "malformed user state event, skipping");
                    self.commit(&record);
                }
                Ok(event) => match self.replay.handle_event(event).await {
                    Ok(()) => self.commit(&record),
                    Err(err) => {
                        // 不提交位移，等待重投
                        error!(error = %err, "handle user state event failed");
                    }
                },
            }
        }
        info!("user state consumer stopped");
        Ok(())
    }

    fn commit(&self, record: &rdkafka::message::BorrowedMessage<'_>) {
        if let Err(err) = self.consumer.commit_message(record, CommitMode::Async) {
            warn!(error = %err, "commit offset failed");
        }
    }
}
