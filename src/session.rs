//! 会话存储
//!
//! 集群内唯一的共享可写状态。键 `chatify:session:<uid>`，值为 JSON 会话，
//! TTL 60 秒，由 access 节点在心跳时续签；过期即视为离线。

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Deserialize, Serialize};

/// 会话键前缀
pub const SESSION_KEY_PREFIX: &str = "chatify:session:";
/// 会话 TTL（秒），心跳周期内必须续签
pub const SESSION_TTL_SECONDS: u64 = 60;

/// 用户会话：用户当前连接在哪个 access 节点上
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub uid: String,
    pub username: String,
    pub connection_time: i64,
    pub connection_id: String,
}

pub fn session_key(uid: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{uid}")
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn set_session(&self, session: &Session) -> Result<()>;
    async fn get_session(&self, uid: &str) -> Result<Option<Session>>;
    async fn clear_session(&self, uid: &str) -> Result<()>;
    /// 批量清除；节点下线时一次删除所有持有的会话
    async fn batch_clear_sessions(&self, uids: &[String]) -> Result<()>;
    /// 续签 TTL
    async fn renew_session(&self, uid: &str) -> Result<()>;
}

pub struct RedisSessionStore {
    client: Arc<redis::Client>,
}

impl RedisSessionStore {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        Ok(ConnectionManager::new(self.client.as_ref().clone()).await?)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn set_session(&self, session: &Session) -> Result<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(session)?;
        let _: () = conn
            .set_ex(session_key(&session.uid), payload, SESSION_TTL_SECONDS)
            .await?;
        Ok(())
    }

    async fn get_session(&self, uid: &str) -> Result<Option<Session>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(session_key(uid)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn clear_session(&self, uid: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(session_key(uid)).await?;
        Ok(())
    }

    async fn batch_clear_sessions(&self, uids: &[String]) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = uids.iter().map(|uid| session_key(uid)).collect();
        let mut conn = self.connection().await?;
        let _: () = conn.del(keys).await?;
        Ok(())
    }

    async fn renew_session(&self, uid: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .expire(session_key(uid), SESSION_TTL_SECONDS as i64)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_schema() {
        assert_eq!(session_key("u1"), "chatify:session:u1");
    }

    #[test]
    fn session_json_shape() {
        let session = Session {
            uid: "u1".to_string(),
            username: "alice".to_string(),
            connection_time: 1_700_000_000,
            connection_id: "node-1".to_string(),
        };
        let json = serde_json::to_value(&session).expect("serialize session");
        assert_eq!(json["uid"], "u1");
        assert_eq!(json["username"], "alice");
        assert_eq!(json["connection_time"], 1_700_000_000);
        assert_eq!(json["connection_id"], "node-1");

        let parsed: Session = serde_json::from_value(json).expect("deserialize session");
        assert_eq!(parsed, session);
    }
}
