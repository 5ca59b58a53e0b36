//! 通用工具

use chrono::Utc;
use uuid::Uuid;

/// 当前 Unix 秒
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// 当前毫秒时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 生成事件 ID
pub fn new_event_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 生成服务实例 ID
pub fn new_instance_id(service: &str) -> String {
    format!("{service}-{}", Uuid::new_v4().simple())
}
