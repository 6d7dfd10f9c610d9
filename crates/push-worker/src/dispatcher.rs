//! 推送分发器
//!
//! 通过 `PushSender` trait 抽象推送行为，生产实现走 FCM 的 HTTP 接口。
//! 推送失败（网络错误、令牌失效、配额超限）返回 DispatchError 并带上
//! 目标用户标识，由 Router 在调用点记录日志并吞掉，管道整体必须存活。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use swap_shared::config::FcmConfig;

use crate::error::PushWorkerError;

/// 所有推送使用的固定标题
pub const PUSH_TITLE: &str = "Notifica da BimboSwap";

/// 单次推送的消息内容，每次分发现场构造，不持久化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub token: String,
}

impl PushMessage {
    /// 用固定标题构造一条推送消息
    pub fn new(body: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            title: PUSH_TITLE.to_string(),
            body: body.into(),
            token: token.into(),
        }
    }
}

/// 推送发送器 trait
///
/// 成功时返回推送服务分配的消息标识，本服务只用于日志追踪。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, user_id: i64, message: &PushMessage) -> Result<String, PushWorkerError>;
}

// ---------------------------------------------------------------------------
// FCM 发送器
// ---------------------------------------------------------------------------

/// FCM 请求体，对应 legacy HTTP 接口的 JSON 格式
#[derive(Debug, Serialize)]
struct FcmRequest<'a> {
    notification: FcmNotification<'a>,
    to: &'a str,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// FCM 响应体，只提取本服务关心的字段
#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    message_id: Option<String>,
    error: Option<String>,
}

/// 基于 FCM HTTP 接口的推送发送器
pub struct FcmSender {
    client: reqwest::Client,
    config: FcmConfig,
}

impl FcmSender {
    pub fn new(config: FcmConfig) -> Result<Self, PushWorkerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PushWorkerError::Connection(format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self { client, config })
    }

    fn dispatch_error(user_id: i64, reason: impl Into<String>) -> PushWorkerError {
        PushWorkerError::Dispatch {
            user_id,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PushSender for FcmSender {
    async fn send(&self, user_id: i64, message: &PushMessage) -> Result<String, PushWorkerError> {
        let request = FcmRequest {
            notification: FcmNotification {
                title: &message.title,
                body: &message.body,
            },
            to: &message.token,
        };

        debug!(user_id, title = %message.title, "提交 FCM 推送请求");

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("key={}", self.config.server_key),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::dispatch_error(user_id, format!("请求发送失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::dispatch_error(
                user_id,
                format!("FCM 返回状态码 {status}"),
            ));
        }

        let body: FcmResponse = response
            .json()
            .await
            .map_err(|e| Self::dispatch_error(user_id, format!("响应解析失败: {e}")))?;

        let result = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Self::dispatch_error(user_id, "响应缺少 results 字段"))?;

        if let Some(error) = result.error {
            return Err(Self::dispatch_error(user_id, format!("FCM 拒绝: {error}")));
        }

        let message_id = result
            .message_id
            .ok_or_else(|| Self::dispatch_error(user_id, "响应缺少 message_id"))?;

        info!(user_id, message_id = %message_id, "推送已提交");
        Ok(message_id)
    }
}
