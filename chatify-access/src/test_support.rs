//! 测试桩：内存版依赖实现

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;

use chatify_im_core::session::{Session, SessionStore};

use crate::domain::manager::ConnectionManager;
use crate::domain::repositories::{DispatchError, EventPublisher, UpstreamDispatcher};

#[derive(Default)]
pub(crate) struct MemorySessionStore {
    pub sessions: Mutex<HashMap<String, Session>>,
    pub fail_set: Mutex<bool>,
    pub renew_count: Mutex<usize>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set_session(&self, session: &Session) -> Result<()> {
        if *self.fail_set.lock().unwrap() {
            bail!("session store unavailable");
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session.uid.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, uid: &str) -> Result<Option<Session>> {
        Ok(self.sessions.lock().unwrap().get(uid).cloned())
    }

    async fn clear_session(&self, uid: &str) -> Result<()> {
        self.sessions.lock().unwrap().remove(uid);
        Ok(())
    }

    async fn batch_clear_sessions(&self, uids: &[String]) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        for uid in uids {
            sessions.remove(uid);
        }
        Ok(())
    }

    async fn renew_session(&self, _uid: &str) -> Result<()> {
        *self.renew_count.lock().unwrap() += 1;
        Ok(())
    }
}

/// 记录发布过的 (topic, key, payload)
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    pub published: Mutex<Vec<(String, String, Vec<u8>)>>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), key.to_string(), payload));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct NoopDispatcher;

#[async_trait]
impl UpstreamDispatcher for NoopDispatcher {
    async fn dispatch(&self, _user_id: &str, _payload: &[u8]) -> Result<(), DispatchError> {
        Ok(())
    }
}

pub(crate) fn test_manager(node_id: &str) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        node_id.to_string(),
        Arc::new(MemorySessionStore::default()),
        Arc::new(RecordingPublisher::default()),
        Arc::new(NoopDispatcher),
    ))
}
