//! 离线回放测试

use std::sync::Arc;

use anyhow::anyhow;

use chatify_im_core::events::UserStateMessage;
use chatify_proto::BaseMessage;

use crate::domain::model::REPLAY_PAGE_SIZE;
use crate::test_support::{MemoryDedupStore, MockDispatcher, MockOfflineRepository, base_message};

use super::replay::PresenceReplayService;

struct Fixture {
    dedup: Arc<MemoryDedupStore>,
    offline: Arc<MockOfflineRepository>,
    dispatcher: Arc<MockDispatcher>,
    service: PresenceReplayService,
}

fn fixture() -> Fixture {
    let dedup = Arc::new(MemoryDedupStore::default());
    let offline = Arc::new(MockOfflineRepository::default());
    let dispatcher = Arc::new(MockDispatcher::default());
    let service = PresenceReplayService::new(dedup.clone(), offline.clone(), dispatcher.clone());
    Fixture {
        dedup,
        offline,
        dispatcher,
        service,
    }
}

fn online_event(id: &str, user_id: &str, connection_id: &str) -> UserStateMessage {
    let mut event = UserStateMessage::online(user_id, &format!("user-{user_id}"), 1, connection_id);
    event.id = id.to_string();
    event
}

fn offline_event(id: &str, user_id: &str) -> UserStateMessage {
    let mut event = UserStateMessage::offline(user_id, &format!("user-{user_id}"), 1, "n1");
    event.id = id.to_string();
    event
}

/// 测试：S4 三条离线消息按 msg_id 顺序整页回放并全部确认
#[tokio::test]
async fn replays_offline_messages_in_order() {
    let f = fixture();
    f.offline.pages.lock().unwrap().push_back(vec![
        base_message("x", "u4"),
        base_message("y", "u4"),
        base_message("z", "u4"),
    ]);

    f.service
        .handle_event(online_event("e1", "u4", "n1"))
        .await
        .expect("handle event");

    let calls = f.dispatcher.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "n1");
    assert_eq!(calls[0].1, vec!["x", "y", "z"]);

    let acks = f.offline.acknowledged.lock().unwrap();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].0, "u4");
    assert_eq!(acks[0].1, vec!["x", "y", "z"]);
}

/// 测试：S5 同一事件 id 消费两次，只有一次回放、一次确认
#[tokio::test]
async fn duplicate_event_replays_once() {
    let f = fixture();
    f.offline
        .pages
        .lock()
        .unwrap()
        .push_back(vec![base_message("x", "u4")]);

    f.service
        .handle_event(online_event("e1", "u4", "n1"))
        .await
        .expect("first delivery");
    f.service
        .handle_event(online_event("e1", "u4", "n1"))
        .await
        .expect("duplicate delivery");

    assert_eq!(f.dispatcher.calls.lock().unwrap().len(), 1);
    assert_eq!(f.offline.acknowledged.lock().unwrap().len(), 1);
    assert_eq!(f.offline.retrieve_calls.lock().unwrap().len(), 1);
}

/// 测试：整页（1000 条）之后带游标继续拉取
#[tokio::test]
async fn full_page_advances_cursor() {
    let f = fixture();
    let full_page: Vec<BaseMessage> = (0..REPLAY_PAGE_SIZE)
        .map(|i| base_message(&format!("m{i:04}"), "u4"))
        .collect();
    let last_id = full_page.last().map(|m| m.msg_id.clone()).unwrap();
    {
        let mut pages = f.offline.pages.lock().unwrap();
        pages.push_back(full_page);
        pages.push_back(vec![base_message("tail", "u4")]);
    }

    f.service
        .handle_event(online_event("e2", "u4", "n1"))
        .await
        .expect("handle event");

    let retrieves = f.offline.retrieve_calls.lock().unwrap();
    assert_eq!(retrieves.len(), 2);
    assert_eq!(retrieves[0], ("u4".to_string(), String::new()));
    assert_eq!(retrieves[1], ("u4".to_string(), last_id));
    assert_eq!(f.offline.acknowledged.lock().unwrap().len(), 2);
}

/// 测试：确认只覆盖成功子集
#[tokio::test]
async fn acknowledges_only_delivered_subset() {
    let f = fixture();
    f.offline.pages.lock().unwrap().push_back(vec![
        base_message("x", "u4"),
        base_message("y", "u4"),
    ]);
    f.dispatcher.push_response(Ok(vec!["x".to_string()]));

    f.service
        .handle_event(online_event("e3", "u4", "n1"))
        .await
        .expect("handle event");

    let acks = f.offline.acknowledged.lock().unwrap();
    assert_eq!(acks[0].1, vec!["x"]);
}

/// 测试：下线事件不触发任何回放
#[tokio::test]
async fn offline_event_is_noop() {
    let f = fixture();
    f.service
        .handle_event(offline_event("e4", "u4"))
        .await
        .expect("handle event");
    assert!(f.offline.retrieve_calls.lock().unwrap().is_empty());
    assert!(f.dispatcher.calls.lock().unwrap().is_empty());
}

/// 测试：没有离线消息的上线事件只拉一次空页
#[tokio::test]
async fn empty_queue_stops_immediately() {
    let f = fixture();
    f.service
        .handle_event(online_event("e5", "u4", "n1"))
        .await
        .expect("handle event");
    assert_eq!(f.offline.retrieve_calls.lock().unwrap().len(), 1);
    assert!(f.dispatcher.calls.lock().unwrap().is_empty());
    assert!(f.offline.acknowledged.lock().unwrap().is_empty());
}

/// 测试：回放分发失败向上传播，事件可被重投
#[tokio::test]
async fn dispatch_failure_propagates() {
    let f = fixture();
    f.offline
        .pages
        .lock()
        .unwrap()
        .push_back(vec![base_message("x", "u4")]);
    f.dispatcher.push_response(Err(anyhow!("node unreachable")));

    let err = f
        .service
        .handle_event(online_event("e6", "u4", "n1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("replay dispatch failed"));
    assert!(f.offline.acknowledged.lock().unwrap().is_empty());
    // 事件 id 已被标记；真实部署下这里依赖 offline 存储排除已送达实现幂等
    assert!(f.dedup.seen.lock().unwrap().contains("e6"));
}
