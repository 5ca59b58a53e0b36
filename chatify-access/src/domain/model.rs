//! 连接域模型

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 升级握手后确定的客户端身份（由外部认证方写入请求头）
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user_id: String,
    pub user_name: String,
}

/// 单个在线客户端的句柄
///
/// 读写泵各自持有 socket 的一半，这里只保留投递入口与取消令牌。
pub(crate) struct ClientHandle {
    pub user_id: String,
    pub user_name: String,
    pub connection_time: i64,
    /// 连接代次；同一 uid 重连后旧代次的清理不得影响新连接
    pub seq: u64,
    pub sender: mpsc::Sender<String>,
    pub cancel: CancellationToken,
}

/// 非阻塞投递的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 已进入发送队列；对上游即视为投递成功
    Queued,
    /// 队列满，按背压策略丢弃
    QueueFull,
    /// 用户不在本节点
    NotConnected,
}
