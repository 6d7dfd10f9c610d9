//! 数据库连接管理模块
//!
//! 提供 PostgreSQL 连接池管理，支持健康检查和 NOTIFY 发布。

use crate::config::DatabaseConfig;
use crate::error::{Result, SwapError};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// 数据库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 创建数据库连接池
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!("Database connection pool created");

        Ok(Self { pool })
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(SwapError::from)
    }

    /// 返回当前连接的数据库名和 schema，启动时打印用于确认连到了正确的库
    pub async fn identity(&self) -> Result<(String, String)> {
        let row: (String, String) =
            sqlx::query_as("SELECT current_database(), current_schema()")
                .fetch_one(&self.pool)
                .await?;
        Ok(row)
    }

    /// 在指定通道上发布一条 NOTIFY 消息
    ///
    /// NOTIFY 语句不支持参数绑定，改用 pg_notify 函数以避免拼接 SQL。
    pub async fn notify(&self, channel: &str, payload: &str) -> Result<()> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

impl std::ops::Deref for Database {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
