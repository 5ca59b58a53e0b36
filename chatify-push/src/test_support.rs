//! 测试桩：内存版依赖实现

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;

use chatify_im_core::dedup::DedupStore;
use chatify_im_core::session::{Session, SessionStore};
use chatify_proto::BaseMessage;

use crate::domain::model::{PersistedMessage, StatusUpdate};
use crate::domain::repositories::{AccessDispatcher, MessageRepository, OfflineRepository};

pub(crate) fn base_message(msg_id: &str, to_user_id: &str) -> BaseMessage {
    BaseMessage {
        msg_id: msg_id.to_string(),
        to_user_id: to_user_id.to_string(),
        ..Default::default()
    }
}

pub(crate) fn online_session(uid: &str, connection_id: &str) -> Session {
    Session {
        uid: uid.to_string(),
        username: format!("user-{uid}"),
        connection_time: 1_700_000_000,
        connection_id: connection_id.to_string(),
    }
}

#[derive(Default)]
pub(crate) struct MemorySessionStore {
    pub sessions: Mutex<HashMap<String, Session>>,
    /// 查询这些 uid 时模拟存储故障
    pub failing_uids: Mutex<HashSet<String>>,
}

impl MemorySessionStore {
    pub fn with_sessions(sessions: Vec<Session>) -> Self {
        let store = Self::default();
        {
            let mut guard = store.sessions.lock().unwrap();
            for session in sessions {
                guard.insert(session.uid.clone(), session);
            }
        }
        store
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set_session(&self, session: &Session) -> Result<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.uid.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, uid: &str) -> Result<Option<Session>> {
        if self.failing_uids.lock().unwrap().contains(uid) {
            bail!("session store unavailable");
        }
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
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockMessageRepository {
    pub saved: Mutex<Vec<PersistedMessage>>,
    pub updates: Mutex<Vec<StatusUpdate>>,
    pub fail_save: Mutex<bool>,
    pub fail_update: Mutex<bool>,
}

#[async_trait]
impl MessageRepository for MockMessageRepository {
    async fn save_messages(&self, messages: &[PersistedMessage]) -> Result<()> {
        if *self.fail_save.lock().unwrap() {
            bail!("insert failed");
        }
        self.saved.lock().unwrap().extend_from_slice(messages);
        Ok(())
    }

    async fn update_message_statuses(&self, updates: &[StatusUpdate]) -> Result<()> {
        if *self.fail_update.lock().unwrap() {
            bail!("update failed");
        }
        self.updates.lock().unwrap().extend_from_slice(updates);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockOfflineRepository {
    pub archived: Mutex<Vec<(String, Vec<BaseMessage>)>>,
    /// 预置的回放分页，retrieve 依次弹出；弹空后返回空页
    pub pages: Mutex<VecDeque<Vec<BaseMessage>>>,
    pub retrieve_calls: Mutex<Vec<(String, String)>>,
    pub acknowledged: Mutex<Vec<(String, Vec<String>)>>,
    pub fail_archive: Mutex<bool>,
}

#[async_trait]
impl OfflineRepository for MockOfflineRepository {
    async fn archive_messages(&self, task_id: &str, messages: &[BaseMessage]) -> Result<()> {
        if *self.fail_archive.lock().unwrap() {
            bail!("archive failed");
        }
        self.archived
            .lock()
            .unwrap()
            .push((task_id.to_string(), messages.to_vec()));
        Ok(())
    }

    async fn retrieve_offline_messages(
        &self,
        user_id: &str,
        last_message_id: &str,
    ) -> Result<Vec<BaseMessage>> {
        self.retrieve_calls
            .lock()
            .unwrap()
            .push((user_id.to_string(), last_message_id.to_string()));
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn acknowledge_messages(&self, user_id: &str, message_ids: &[String]) -> Result<()> {
        self.acknowledged
            .lock()
            .unwrap()
            .push((user_id.to_string(), message_ids.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockDispatcher {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    /// 预置响应，依次弹出；为空时回显全部请求 ID（全部成功）
    pub responses: Mutex<VecDeque<Result<Vec<String>>>>,
}

impl MockDispatcher {
    pub fn push_response(&self, response: Result<Vec<String>>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl AccessDispatcher for MockDispatcher {
    async fn send_to_connection(
        &self,
        connection_id: &str,
        messages: Vec<BaseMessage>,
    ) -> Result<Vec<String>> {
        let msg_ids: Vec<String> = messages.iter().map(|m| m.msg_id.clone()).collect();
        self.calls
            .lock()
            .unwrap()
            .push((connection_id.to_string(), msg_ids.clone()));
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(msg_ids),
        }
    }
}

#[derive(Default)]
pub(crate) struct MemoryDedupStore {
    pub seen: Mutex<HashSet<String>>,
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn check_and_set(&self, id: &str) -> Result<bool> {
        Ok(self.seen.lock().unwrap().insert(id.to_string()))
    }
}
