//! 告警处理错误类型
//!
//! 覆盖消息解码、收件人查询和通知发送三个阶段。
//! 管道内所有错误都不可重试：消费循环对任意错误的唯一反应是
//! 否认投递且不重新入队。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("消息体格式错误: {0}")]
    Malformed(String),

    /// source 为 None 表示字符串形状就不符合 YYYY-MM-DD，未进入日期解析
    #[error("出发日期无效: {value}")]
    InvalidOutboundDate {
        value: String,
        #[source]
        source: Option<chrono::ParseError>,
    },

    #[error("返程日期无效: {value}")]
    InvalidReturnDate {
        value: String,
        #[source]
        source: Option<chrono::ParseError>,
    },

    #[error("收件人未找到: alert_id={alert_id}")]
    RecipientNotFound { alert_id: i64 },

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("通知发送失败: {0}")]
    Dispatch(String),

    #[error("配置错误: {0}")]
    Config(String),

    /// 订阅、确认或否认失败，只会出现在消费循环这一层
    #[error("消息队列错误: {0}")]
    Broker(#[from] alert_shared::error::InfraError),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, AlertError>;

impl AlertError {
    /// 获取错误码，用于日志和指标标签
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED",
            Self::InvalidOutboundDate { .. } => "INVALID_OUTBOUND_DATE",
            Self::InvalidReturnDate { .. } => "INVALID_RETURN_DATE",
            Self::RecipientNotFound { .. } => "RECIPIENT_NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Dispatch(_) => "DISPATCH_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Broker(_) => "BROKER_ERROR",
        }
    }

    /// 是否为解码阶段的错误
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_) | Self::InvalidOutboundDate { .. } | Self::InvalidReturnDate { .. }
        )
    }

    /// 是否为收件人解析失败（未找到与存储故障在这一层不做区分）
    pub fn is_recipient_resolution(&self) -> bool {
        matches!(self, Self::RecipientNotFound { .. } | Self::Database(_))
    }

    /// 是否属于瞬时故障
    ///
    /// 仅用于日志标注，消费循环不据此改变确认策略。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Dispatch(_))
    }
}
