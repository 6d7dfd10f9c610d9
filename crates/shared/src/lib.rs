//! 共享库
//!
//! 包含推送 Worker 各组件共用的配置、错误处理、数据库连接和日志初始化代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
