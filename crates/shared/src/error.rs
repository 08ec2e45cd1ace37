//! 基础设施错误类型
//!
//! 覆盖配置加载、数据库连接和 AMQP 通道等启动期与传输层错误。
//! 业务处理错误由各服务自行定义，这里只关心"连不上 / 读不到"这一类问题。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("AMQP 错误: {0}")]
    Amqp(String),

    #[error("配置错误: {0}")]
    Config(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, InfraError>;

impl InfraError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Amqp(_) => "AMQP_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<lapin::Error> for InfraError {
    fn from(err: lapin::Error) -> Self {
        Self::Amqp(err.to_string())
    }
}

impl From<config::ConfigError> for InfraError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
