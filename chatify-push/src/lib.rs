//! Chatify Push 服务
//!
//! 接收按收件人寻址的推送任务：查会话定位目标 access 节点、按连接分组
//! 投递、落库记账、离线部分交给 offline 存储；同时消费 `user_state`
//! 事件，在用户上线瞬间回放离线消息。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interface;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;
