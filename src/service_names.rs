//! 微服务服务名定义
//!
//! 注册与发现必须使用这里的常量，保证两侧一致。

/// Access 服务名
///
/// 终结客户端长连接；实例 ID 即路由用的 connection_id。
/// 注册路径: `/chatify/services/access`
pub const ACCESS: &str = "access";

/// Push 服务名
///
/// 推送路由与离线回放。
/// 注册路径: `/chatify/services/push`
pub const PUSH: &str = "push";

/// Offline 服务名（外部协作方）
///
/// 离线消息归档与回放存储。
/// 注册路径: `/chatify/services/offline`
pub const OFFLINE: &str = "offline";
