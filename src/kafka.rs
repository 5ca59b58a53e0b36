//! Kafka 构建器
//!
//! 统一的生产者/消费者构建入口。生产者 snappy 压缩、本地确认即可返回；
//! 消费者关闭自动提交，由调用方在处理成功后手动提交位移。

use anyhow::{Context, Result};
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::FutureProducer;

use crate::config::KafkaClusterConfig;

/// 事件主题
pub mod topics {
    /// 上行业务消息，key = msg_id
    pub const USER_MESSAGE: &str = "user_message";
    /// 用户上下线事件，key = 事件 id
    pub const USER_STATE: &str = "user_state";
    /// 数据上报消息，key = msg_id
    pub const DATA_REPORT: &str = "data_report";
}

/// 构建 Kafka 生产者
pub fn build_kafka_producer(config: &KafkaClusterConfig) -> Result<FutureProducer> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("message.timeout.ms", config.timeout_ms.to_string())
        .set("compression.type", "snappy")
        .set("acks", "1");
    if let Some(client_id) = &config.client_id {
        client_config.set("client.id", client_id);
    }
    client_config
        .create()
        .context("failed to create kafka producer")
}

/// 构建 Kafka 消费者并订阅主题
pub fn build_kafka_consumer(
    config: &KafkaClusterConfig,
    group: &str,
    topics: &[&str],
) -> Result<StreamConsumer> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("group.id", group)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000");
    if let Some(client_id) = &config.client_id {
        client_config.set("client.id", client_id);
    }
    let consumer: StreamConsumer = client_config
        .create()
        .context("failed to create kafka consumer")?;
    consumer
        .subscribe(topics)
        .context("failed to subscribe kafka topics")?;
    Ok(consumer)
}
