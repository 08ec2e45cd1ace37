//! 通知发送器
//!
//! 通过 `NotificationSender` trait 抽象发送行为。生产环境走 SMTP 中继，
//! 本地未配置邮件中继时使用只记录日志的发送器，便于在无外部依赖的情况下
//! 验证消费管道的完整性。

use std::time::Duration;

use alert_shared::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::error::{AlertError, Result};

/// 通知发送器 trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送一封通知；失败原样返回，不在内部重试
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SMTP 发送器
// ---------------------------------------------------------------------------

/// SMTP 邮件发送器
///
/// 传输层内部自带连接池，整个进程共享一个实例。
pub struct SmtpNotificationSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotificationSender {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| AlertError::Config(format!("发件人地址无效: {e}")))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| AlertError::Config(format!("SMTP 中继配置错误: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        info!(host = %config.host, port = config.port, tls = config.use_tls, "SMTP 发送器已初始化");

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

/// 构造纯文本邮件
fn build_message(from: &Mailbox, to: &str, subject: &str, body: &str) -> Result<Message> {
    let to: Mailbox = to
        .parse()
        .map_err(|e| AlertError::Dispatch(format!("收件人地址无效: {e}")))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| AlertError::Dispatch(format!("构造邮件失败: {e}")))
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = build_message(&self.from, to, subject, body)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AlertError::Dispatch(e.to_string()))?;

        info!(channel = "EMAIL", to, subject, "邮件通知已发送");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 日志发送器
// ---------------------------------------------------------------------------

/// 模拟发送器，只记录日志
///
/// SMTP host 未配置时使用，开发环境下可以完整跑通消费管道
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(channel = "LOG", to, subject, body, "模拟发送邮件通知");
        Ok(())
    }
}
