//! Chatify IM 线上契约
//!
//! `.proto` 定义见 `proto/`，构建期由 `tonic-build` 生成。模块层级与
//! proto 包层级一致，跨包引用才能正确解析。

pub mod im {
    pub mod v1 {
        tonic::include_proto!("chatify.im.v1");
    }
}

pub mod access {
    pub mod v1 {
        tonic::include_proto!("chatify.access.v1");
    }
}

pub mod push {
    pub mod v1 {
        tonic::include_proto!("chatify.push.v1");
    }
}

pub mod offline {
    pub mod v1 {
        tonic::include_proto!("chatify.offline.v1");
    }
}

pub use im::v1::{BaseMessage, MessageType, TargetType};
