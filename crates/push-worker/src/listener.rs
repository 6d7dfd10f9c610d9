//! 通道监听器
//!
//! 持有对 NOTIFY 通道的唯一订阅，为每条到达的消息派生一个受信号量
//! 约束的处理任务。消息级失败全部由 Router 自行消化，监听循环只负责
//! 接收与派发；连接级错误对当前会话是致命的，是否重连由配置决定。

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgListener, PgNotification};
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, warn};

use swap_shared::config::ListenerConfig;
use swap_shared::database::Database;

use crate::error::PushWorkerError;
use crate::probe::SelfTestProbe;
use crate::router::EventRouter;

/// 通道监听器
///
/// 组合 Database（订阅连接与自检发布）、EventRouter（消息处理）
/// 和 ListenerConfig（通道名、并发上限、超时、重连开关）。
pub struct ChannelListener {
    db: Database,
    router: Arc<EventRouter>,
    config: ListenerConfig,
}

impl ChannelListener {
    pub fn new(db: Database, router: Arc<EventRouter>, config: ListenerConfig) -> Self {
        Self { db, router, config }
    }

    /// 启动监听循环，直到收到 shutdown 信号或连接断开
    ///
    /// 启动时 spawn 自检探针；每条消息在独立任务中处理，
    /// 信号量限制在途任务数，超时限制单条事件的处理时长。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), PushWorkerError> {
        let mut pg_listener = PgListener::connect_with(self.db.pool())
            .await
            .map_err(|e| PushWorkerError::Connection(format!("建立订阅连接失败: {e}")))?;

        pg_listener
            .listen(&self.config.channel)
            .await
            .map_err(|e| PushWorkerError::Connection(format!("订阅通道失败: {e}")))?;

        info!(
            channel = %self.config.channel,
            max_concurrent_events = self.config.max_concurrent_events,
            reconnect = self.config.reconnect,
            "通道监听已启动"
        );

        let probe = SelfTestProbe::new(
            self.db.clone(),
            self.config.channel.clone(),
            Duration::from_secs(self.config.self_test_delay_seconds),
        );
        tokio::spawn(probe.run());

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_events));
        let event_timeout = Duration::from_secs(self.config.event_timeout_seconds);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = Self::next_notification(&mut pg_listener, self.config.reconnect) => {
                    match received {
                        Ok(Some(notification)) => {
                            self.spawn_handler(notification, &semaphore, event_timeout).await;
                        }
                        Ok(None) => {
                            // try_recv 返回 None 表示连接断开且未启用重连
                            error!(
                                channel = %self.config.channel,
                                "订阅连接已断开且未启用重连，监听退出"
                            );
                            return Err(PushWorkerError::Connection(
                                "订阅连接断开".to_string(),
                            ));
                        }
                        Err(e) => {
                            error!(channel = %self.config.channel, error = %e, "接收通知失败");
                            return Err(e);
                        }
                    }
                }
            }
        }

        info!("通道监听已停止");
        Ok(())
    }

    /// 接收下一条通知
    ///
    /// 重连开启时使用 recv（断线后由 sqlx 透明重建会话并重新 LISTEN）；
    /// 关闭时使用 try_recv，断线表现为 Ok(None)，由调用方终止会话。
    async fn next_notification(
        listener: &mut PgListener,
        reconnect: bool,
    ) -> Result<Option<PgNotification>, PushWorkerError> {
        let received = if reconnect {
            listener.recv().await.map(Some)
        } else {
            listener.try_recv().await
        };

        received.map_err(|e| PushWorkerError::Connection(format!("接收通知失败: {e}")))
    }

    /// 为一条消息派生处理任务
    ///
    /// 在这里等待信号量许可：NOTIFY 突发时接收循环被反压，
    /// 在途的查询/推送链不会超过配置上限。
    async fn spawn_handler(
        &self,
        notification: PgNotification,
        semaphore: &Arc<Semaphore>,
        event_timeout: Duration,
    ) {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            // 信号量只在进程关闭时 close，此处直接丢弃消息
            warn!("信号量已关闭，丢弃消息");
            return;
        };

        let router = Arc::clone(&self.router);
        let payload = notification.payload().to_string();

        tokio::spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(event_timeout, router.handle_payload(&payload)).await {
                Ok(outcome) => {
                    debug!(payload = %payload, outcome = ?outcome, "事件处理完成");
                }
                Err(_) => {
                    warn!(payload = %payload, "事件处理超时，放弃");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::MockPushSender;
    use crate::repository::{MockAnnouncementStore, MockUserDirectory};
    use swap_shared::config::DatabaseConfig;

    fn make_inert_router() -> Arc<EventRouter> {
        let mut announcements = MockAnnouncementStore::new();
        announcements.expect_find_owner().never();
        let mut users = MockUserDirectory::new();
        users.expect_find_device_token().never();
        let mut sender = MockPushSender::new();
        sender.expect_send().never();
        Arc::new(EventRouter::new(
            Arc::new(announcements),
            Arc::new(users),
            Arc::new(sender),
        ))
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_listener_stops_on_shutdown_signal() {
        let db = Database::connect(&DatabaseConfig::default()).await.unwrap();
        let listener = ChannelListener::new(db, make_inert_router(), ListenerConfig::default());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(listener.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
}
