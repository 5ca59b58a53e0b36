//! 记账行的 PostgreSQL 存储
//!
//! 表 `chatify_push_message`，msg_id 唯一。插入带 ON CONFLICT DO NOTHING，
//! 状态更新按 msg_id 寻址，两者都幂等，任务级重试不会产生重复行。

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, QueryBuilder};
use tracing::debug;

use crate::config::PushConfig;
use crate::domain::model::{INSERT_BATCH_SIZE, PersistedMessage, StatusUpdate};
use crate::domain::repositories::MessageRepository;

pub struct PostgresMessageRepository {
    pool: Pool<Postgres>,
}

impl PostgresMessageRepository {
    pub async fn new(config: &PushConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.postgres_max_connections)
            .connect(&config.postgres_url)
            .await
            .context("failed to connect to postgres")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn save_messages(&self, messages: &[PersistedMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        for chunk in messages.chunks(INSERT_BATCH_SIZE) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO chatify_push_message \
                 (id, msg_id, message_type, from_user_id, target_type, to_user_id, content, \
                  \"timestamp\", expire_time, content_id, task_id, status, description, \
                  created_at, updated_at) ",
            );
            builder.push_values(chunk, |mut row, message| {
                row.push_bind(&message.id)
                    .push_bind(&message.msg_id)
                    .push_bind(message.message_type)
                    .push_bind(&message.from_user_id)
                    .push_bind(message.target_type)
                    .push_bind(&message.to_user_id)
                    .push_bind(&message.content)
                    .push_bind(message.timestamp)
                    .push_bind(message.expire_time)
                    .push_bind(&message.content_id)
                    .push_bind(&message.task_id)
                    .push_bind(message.status.as_str())
                    .push_bind(&message.description)
                    .push_bind(now)
                    .push_bind(now);
            });
            builder.push(" ON CONFLICT (msg_id) DO NOTHING");
            builder
                .build()
                .execute(&self.pool)
                .await
                .context("failed to save messages")?;
        }
        debug!(count = messages.len(), "messages saved");
        Ok(())
    }

    async fn update_message_statuses(&self, updates: &[StatusUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        for update in updates {
            sqlx::query(
                "UPDATE chatify_push_message \
                 SET status = $1, description = $2, updated_at = $3 \
                 WHERE msg_id = $4",
            )
            .bind(update.status.as_str())
            .bind(&update.description)
            .bind(now)
            .bind(&update.msg_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update message status, msg_id={}", update.msg_id))?;
        }
        debug!(count = updates.len(), "message statuses updated");
        Ok(())
    }
}
