//! 消费端去重
//!
//! 事件总线是至少一次投递，消费者在产生任何业务副作用之前必须按
//! 消息/事件 ID 去重。键 `kafka:dedup:msg:<id>`，TTL 24 小时。

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

/// 去重键前缀
pub const DEDUP_KEY_PREFIX: &str = "kafka:dedup:msg:";
/// 去重键 TTL（秒）
pub const DEDUP_TTL_SECONDS: i64 = 24 * 60 * 60;

#[async_trait]
pub trait DedupStore: Send + Sync {
    /// 检查并标记消息是否已消费
    ///
    /// 返回 true 表示首次出现，调用方应继续处理；false 表示重复，跳过。
    async fn check_and_set(&self, id: &str) -> Result<bool>;
}

pub struct RedisDedupStore {
    client: Arc<redis::Client>,
}

impl RedisDedupStore {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }

    fn dedup_key(id: &str) -> String {
        format!("{DEDUP_KEY_PREFIX}{id}")
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn check_and_set(&self, id: &str) -> Result<bool> {
        if id.is_empty() {
            bail!("dedup id cannot be empty");
        }
        let mut conn = ConnectionManager::new(self.client.as_ref().clone()).await?;
        let key = Self::dedup_key(id);
        let is_new: bool = conn.set_nx(&key, 1).await?;
        if is_new {
            let _: () = conn.expire(&key, DEDUP_TTL_SECONDS).await?;
        }
        Ok(is_new)
    }
}
