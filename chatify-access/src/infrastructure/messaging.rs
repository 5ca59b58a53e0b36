//! Kafka 事件发布

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};

use chatify_im_core::config::KafkaClusterConfig;
use chatify_im_core::kafka::build_kafka_producer;

use crate::domain::repositories::EventPublisher;

pub struct KafkaEventPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaEventPublisher {
    pub fn new(config: &KafkaClusterConfig) -> Result<Self> {
        let producer = build_kafka_producer(config)?;
        Ok(Self {
            producer,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let record = FutureRecord::to(topic).payload(&payload).key(key);
        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(err, _)| anyhow!("failed to enqueue event to kafka: {err}"))?;
        Ok(())
    }
}
