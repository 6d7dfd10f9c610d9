//! 启动自检探针
//!
//! 启动后延迟固定秒数，在订阅的同一通道上发布一条 `test:<nonce>` 消息，
//! 验证 NOTIFY 链路端到端可达。探针失败只记日志，不影响正常消息处理。

use std::time::Duration;

use tracing::{error, info};
use uuid::Uuid;

use swap_shared::database::Database;

/// 自检探针
pub struct SelfTestProbe {
    db: Database,
    channel: String,
    delay: Duration,
}

impl SelfTestProbe {
    pub fn new(db: Database, channel: impl Into<String>, delay: Duration) -> Self {
        Self {
            db,
            channel: channel.into(),
            delay,
        }
    }

    /// 等待固定延迟后发出一条自检 NOTIFY
    ///
    /// 由监听循环 spawn 为独立任务，不阻塞消息接收。
    pub async fn run(self) {
        tokio::time::sleep(self.delay).await;

        let payload = Self::test_payload();
        match self.db.notify(&self.channel, &payload).await {
            Ok(()) => {
                info!(channel = %self.channel, payload = %payload, "自检 NOTIFY 已发送");
            }
            Err(e) => {
                error!(channel = %self.channel, error = %e, "自检 NOTIFY 发送失败");
            }
        }
    }

    /// 生成带随机 nonce 的自检负载，nonce 用于在日志中区分本次探测
    fn test_payload() -> String {
        format!("test:{}", Uuid::now_v7())
    }
}
