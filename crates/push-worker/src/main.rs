//! 推送 Worker 服务入口
//!
//! 显式完成全部初始化：加载配置 -> 初始化日志 -> 建立数据库连接池 ->
//! 构造各组件并注入依赖 -> 启动监听循环。没有任何全局状态或
//! import 时副作用，凭据全部来自配置层。

use std::sync::Arc;

use anyhow::Result;
use swap_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use push_worker::dispatcher::FcmSender;
use push_worker::listener::ChannelListener;
use push_worker::repository::{PgAnnouncementStore, PgUserDirectory};
use push_worker::router::EventRouter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 统一加载配置：config/{service_name}.toml + SWAP_ 环境变量
    let config = AppConfig::load("push-worker").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });

    // 2. 初始化日志
    observability::init(&config.observability)?;

    info!("Starting push-worker...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 初始化数据库连接池并确认连到了正确的库
    let db = Database::connect(&config.database).await?;
    let (database, schema) = db.identity().await?;
    info!(database = %database, schema = %schema, "Database connection established");

    // 4. 构造推送发送器与数据访问组件
    let sender = Arc::new(FcmSender::new(config.fcm.clone())?);
    let announcements = Arc::new(PgAnnouncementStore::new(db.pool().clone()));
    let users = Arc::new(PgUserDirectory::new(db.pool().clone()));

    // 5. 组装事件路由器与通道监听器
    let router = Arc::new(EventRouter::new(announcements, users, sender));
    let listener = ChannelListener::new(db.clone(), router, config.listener.clone());

    // 6. 监听 Ctrl+C，通过 watch 通道通知监听循环优雅退出
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "监听退出信号失败");
        }
        info!("收到退出信号，开始优雅关闭");
        let _ = shutdown_tx.send(true);
    });

    let result = listener.run(shutdown_rx).await;

    db.close().await;
    info!("push-worker stopped");

    result.map_err(Into::into)
}
