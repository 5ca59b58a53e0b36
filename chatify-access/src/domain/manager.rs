//! 连接管理器
//!
//! 每个客户端由一读一写两个协作泵加一个有界发送队列组成，客户端之间
//! 不共享任何可变状态；跨客户端交互只经过这里的注册表。注册表由单个
//! 读写锁保护，任何持锁代码段都不允许跨越网络调用。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{RwLock, mpsc};
use tokio::time::{MissedTickBehavior, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chatify_im_core::events::UserStateMessage;
use chatify_im_core::kafka::topics;
use chatify_im_core::session::{Session, SessionStore};
use chatify_im_core::utils;

use super::model::{ClientHandle, ClientIdentity, SendOutcome};
use super::repositories::{DispatchError, EventPublisher, UpstreamDispatcher};

/// 单帧读上限
pub const READ_LIMIT_BYTES: usize = 512 << 10;
/// 读超时；窗口内无任何入站流量（含 pong）即判定连接死亡
pub const READ_DEADLINE: Duration = Duration::from_secs(60);
/// 单帧写超时
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// 服务端 ping 周期，同时触发会话续签
pub const PING_PERIOD: Duration = Duration::from_secs(54);
/// 每客户端发送队列容量
pub const SEND_QUEUE_CAPACITY: usize = 100;

/// 连接管理器
pub struct ConnectionManager {
    node_id: String,
    clients: RwLock<HashMap<String, ClientHandle>>,
    next_seq: AtomicU64,
    session: Arc<dyn SessionStore>,
    publisher: Arc<dyn EventPublisher>,
    dispatcher: Arc<dyn UpstreamDispatcher>,
}

impl ConnectionManager {
    pub fn new(
        node_id: String,
        session: Arc<dyn SessionStore>,
        publisher: Arc<dyn EventPublisher>,
        dispatcher: Arc<dyn UpstreamDispatcher>,
    ) -> Self {
        Self {
            node_id,
            clients: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            session,
            publisher,
            dispatcher,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// 当前连接数
    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// 接管一条升级完成的连接，阻塞到该连接关闭
    pub async fn start_client<T>(
        self: Arc<Self>,
        ws: WebSocketStream<T>,
        identity: ClientIdentity,
        root: &CancellationToken,
    ) where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection_time = utils::now_unix();
        let session = Session {
            uid: identity.user_id.clone(),
            username: identity.user_name.clone(),
            connection_time,
            connection_id: self.node_id.clone(),
        };
        // 会话写失败直接断开；没有会话的连接对集群不可见
        if let Err(err) = self.session.set_session(&session).await {
            error!(user_id = %identity.user_id, error = %err, "set session failed, closing connection");
            let (mut sink, _stream) = ws.split();
            let _ = sink.send(Message::Close(None)).await;
            return;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let cancel = root.child_token();
        let handle = ClientHandle {
            user_id: identity.user_id.clone(),
            user_name: identity.user_name.clone(),
            connection_time,
            seq,
            sender: tx,
            cancel: cancel.clone(),
        };
        {
            let mut clients = self.clients.write().await;
            if let Some(previous) = clients.insert(identity.user_id.clone(), handle) {
                warn!(user_id = %identity.user_id, "duplicate connection, replacing previous client");
                previous.cancel.cancel();
            }
        }

        self.publish_state(UserStateMessage::online(
            &identity.user_id,
            &identity.user_name,
            connection_time,
            &self.node_id,
        ))
        .await;

        let (sink, stream) = ws.split();
        let writer = {
            let manager = Arc::clone(&self);
            let user_id = identity.user_id.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                manager.write_pump(sink, rx, user_id, cancel).await;
            })
        };

        self.read_pump(stream, &identity, &cancel).await;
        self.stop_client(&identity.user_id, seq).await;
        let _ = writer.await;
    }

    /// 停止并清理一个客户端；代次不匹配说明该 uid 已被新连接接管
    async fn stop_client(&self, user_id: &str, seq: u64) {
        let removed = {
            let mut clients = self.clients.write().await;
            match clients.get(user_id) {
                Some(handle) if handle.seq == seq => clients.remove(user_id),
                _ => None,
            }
        };
        let Some(handle) = removed else {
            debug!(user_id, "client already replaced or removed");
            return;
        };
        handle.cancel.cancel();
        if let Err(err) = self.session.clear_session(user_id).await {
            error!(user_id, error = %err, "clear session failed");
        }
        self.publish_state(UserStateMessage::offline(
            &handle.user_id,
            &handle.user_name,
            handle.connection_time,
            &self.node_id,
        ))
        .await;
        debug!(user_id, "client disconnected");
    }

    /// 非阻塞投递到指定用户的发送队列
    ///
    /// 队列满即丢弃，这是既定的背压策略；丢弃对上游表现为投递失败。
    pub async fn try_send_to_user(&self, user_id: &str, payload: String) -> SendOutcome {
        let clients = self.clients.read().await;
        let Some(handle) = clients.get(user_id) else {
            return SendOutcome::NotConnected;
        };
        match handle.sender.try_send(payload) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id, "send queue is full, kick out");
                SendOutcome::QueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::NotConnected,
        }
    }

    /// 进程退出：关闭全部连接并批量删除会话
    ///
    /// 单条删除会在节点下线瞬间压垮会话存储，必须走批量接口。
    pub async fn shutdown(&self) {
        let handles: Vec<ClientHandle> = {
            let mut clients = self.clients.write().await;
            clients.drain().map(|(_, handle)| handle).collect()
        };
        let uids: Vec<String> = handles.iter().map(|h| h.user_id.clone()).collect();
        for handle in &handles {
            handle.cancel.cancel();
        }
        if let Err(err) = self.session.batch_clear_sessions(&uids).await {
            error!(error = %err, "batch clear sessions failed");
        }
        info!(count = uids.len(), "connection manager closed");
    }

    async fn publish_state(&self, event: UserStateMessage) {
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "encode user state event failed");
                return;
            }
        };
        if let Err(err) = self.publisher.publish(topics::USER_STATE, &event.id, payload).await {
            error!(user_id = %event.user_id, error = %err, "publish user state event failed");
        }
    }

    /// 读泵：入站帧驱动；60 秒无流量、读错误、对端关闭帧都终止连接
    pub(crate) async fn read_pump<S>(
        &self,
        mut stream: S,
        identity: &ClientIdentity,
        cancel: &CancellationToken,
    ) where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = timeout(READ_DEADLINE, stream.next()) => frame,
            };
            let frame = match frame {
                Err(_) => {
                    warn!(user_id = %identity.user_id, "read deadline exceeded");
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    warn!(user_id = %identity.user_id, error = %err, "read message error");
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            };
            match frame {
                Message::Text(text) => self.handle_upstream(identity, text.as_bytes()).await,
                Message::Binary(data) => self.handle_upstream(identity, &data).await,
                Message::Close(_) => {
                    info!(user_id = %identity.user_id, "peer closed connection");
                    break;
                }
                // ping/pong 本身就是有效流量，读超时已随本次读取刷新
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Frame(_) => {}
            }
        }
    }

    async fn handle_upstream(&self, identity: &ClientIdentity, payload: &[u8]) {
        match self.dispatcher.dispatch(&identity.user_id, payload).await {
            Ok(()) => {}
            Err(DispatchError::Malformed(reason)) => {
                warn!(user_id = %identity.user_id, reason = %reason, "malformed upstream message");
                let frame = serde_json::json!({ "error": reason }).to_string();
                let _ = self.try_send_to_user(&identity.user_id, frame).await;
            }
            Err(DispatchError::Publish(err)) => {
                error!(user_id = %identity.user_id, error = %err, "dispatch upstream message failed");
            }
        }
    }

    /// 写泵：严格按入队顺序出帧；54 秒 ping 一次并续签会话；
    /// 任何写失败终止连接
    pub(crate) async fn write_pump<K>(
        &self,
        mut sink: K,
        mut rx: mpsc::Receiver<String>,
        user_id: String,
        cancel: CancellationToken,
    ) where
        K: Sink<Message, Error = WsError> + Unpin,
    {
        let mut ticker = tokio::time::interval(PING_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // interval 的首个 tick 立即完成

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = timeout(WRITE_DEADLINE, sink.send(Message::Close(None))).await;
                    break;
                }
                maybe = rx.recv() => match maybe {
                    Some(payload) => {
                        match timeout(WRITE_DEADLINE, sink.send(Message::Text(payload))).await {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => {
                                error!(user_id = %user_id, error = %err, "write message error");
                                break;
                            }
                            Err(_) => {
                                error!(user_id = %user_id, "write deadline exceeded");
                                break;
                            }
                        }
                    }
                    None => {
                        let _ = timeout(WRITE_DEADLINE, sink.send(Message::Close(None))).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    match timeout(WRITE_DEADLINE, sink.send(Message::Ping(Vec::new()))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            error!(user_id = %user_id, error = %err, "write ping error");
                            break;
                        }
                        Err(_) => {
                            error!(user_id = %user_id, "ping deadline exceeded");
                            break;
                        }
                    }
                    if let Err(err) = self.session.renew_session(&user_id).await {
                        error!(user_id = %user_id, error = %err, "renew session error");
                    }
                }
            }
        }
        // 写泵退出即宣告连接死亡，读泵随令牌一起退出
        cancel.cancel();
    }

    /// 测试辅助：注册一个不带真实 socket 的客户端
    #[cfg(test)]
    pub(crate) async fn register_test_client(
        &self,
        user_id: &str,
        capacity: usize,
    ) -> (mpsc::Receiver<String>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let handle = ClientHandle {
            user_id: user_id.to_string(),
            user_name: format!("user-{user_id}"),
            connection_time: utils::now_unix(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            sender: tx,
            cancel: cancel.clone(),
        };
        self.clients.write().await.insert(user_id.to_string(), handle);
        (rx, cancel)
    }
}
