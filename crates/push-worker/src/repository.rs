//! 数据访问层
//!
//! 定义公告归属与设备令牌两个点查的 trait 接口，便于 Router 依赖抽象而非
//! 具体实现，支持 mock 测试。本服务对这两张表只读，按需查询，不做缓存。

use async_trait::async_trait;
use sqlx::PgPool;

use swap_shared::error::Result;

/// 公告存储接口：公告标识 -> 归属用户标识
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnnouncementStore: Send + Sync {
    /// 点查公告的归属用户，公告不存在时返回 None
    async fn find_owner(&self, announcement_id: i64) -> Result<Option<i64>>;
}

/// 用户目录接口：用户标识 -> 设备推送令牌
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 查询用户当前注册的设备令牌
    ///
    /// 用户不存在与用户未注册令牌同样返回 None，两者对推送管道而言
    /// 都是静默跳过，不构成错误。
    async fn find_device_token(&self, user_id: i64) -> Result<Option<String>>;
}

/// 基于 PostgreSQL 的公告存储
pub struct PgAnnouncementStore {
    pool: PgPool,
}

impl PgAnnouncementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnnouncementStore for PgAnnouncementStore {
    async fn find_owner(&self, announcement_id: i64) -> Result<Option<i64>> {
        let owner = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT user_id
            FROM announcements
            WHERE id = $1
            "#,
        )
        .bind(announcement_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }
}

/// 基于 PostgreSQL 的用户目录
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_device_token(&self, user_id: i64) -> Result<Option<String>> {
        // device_token 列可空，外层 Option 表示行不存在，内层表示列为 NULL
        let token = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT device_token
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token.flatten())
    }
}
