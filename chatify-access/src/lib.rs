//! Chatify Access 节点
//!
//! 每个实例终结一批客户端 WebSocket 连接：维护会话表、发布上下线事件、
//! 接收上行消息写入事件总线，并通过 gRPC 承接 push 服务的下行投递。

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;
