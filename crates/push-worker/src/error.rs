//! 推送 Worker 错误类型
//!
//! 区分连接级错误（终结当前订阅会话）与事件级错误（只丢弃当前事件），
//! 便于监听循环决定继续还是退出。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushWorkerError {
    /// 订阅或连接阶段的错误，对当前会话是致命的
    #[error("通道连接失败: {0}")]
    Connection(String),

    /// 推送服务调用失败，只影响当前事件
    #[error("推送发送失败: 用户={user_id}, 原因={reason}")]
    Dispatch { user_id: i64, reason: String },

    /// 事件负载无法解析出合法的标识
    #[error("事件负载格式无效: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Shared(#[from] swap_shared::error::SwapError),
}
