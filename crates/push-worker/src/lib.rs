//! 推送 Worker 服务
//!
//! 订阅 PostgreSQL 的 NOTIFY 通道，将售出事件解析为类型化事件，
//! 解析出公告的归属用户后通过 FCM 向其设备推送通知。
//! 单条消息的处理失败只影响该条消息，订阅循环永不因此中断。

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod listener;
pub mod probe;
pub mod repository;
pub mod router;
