//! 价格告警通知服务
//!
//! 消费价格变动队列并向订阅者发送邮件提醒。

use std::sync::Arc;

use alert_shared::{amqp::AmqpConnection, config::AppConfig, database::Database, observability};
use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use alert_worker::{
    consumer::AlertConsumer,
    handler::MessageHandler,
    link::GoogleFlightsLinkGenerator,
    process_alert::ProcessAlert,
    repository::PgRecipientRepository,
    sender::{LogNotificationSender, NotificationSender, SmtpNotificationSender},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置并初始化日志与指标（/health 与 /metrics 共用 server 端口）
    let config = AppConfig::load("alert-worker")?;
    let _guard = observability::init(&config).await?;

    info!(
        environment = %config.environment,
        queue = %config.amqp.queue,
        "Starting alert-worker..."
    );

    // 2. 进程级连接，只建立一次
    let db = Database::connect(&config.database).await?;
    let amqp = AmqpConnection::connect(&config.amqp).await?;

    // 3. 协作者
    let sender: Arc<dyn NotificationSender> = if config.smtp.host.is_empty() {
        warn!("未配置 SMTP host，通知只写入日志");
        Arc::new(LogNotificationSender)
    } else {
        Arc::new(SmtpNotificationSender::new(&config.smtp)?)
    };
    let link_generator = Arc::new(GoogleFlightsLinkGenerator::new(
        config.links.base_url.clone(),
    ));
    let repository = Arc::new(PgRecipientRepository::new(db.pool().clone()));

    // 4. 用例 -> 处理器 -> 消费者
    let use_case = Arc::new(ProcessAlert::new(link_generator, repository, sender));
    let consumer = AlertConsumer::new(MessageHandler::new(use_case));

    // 5. Ctrl+C 触发关闭，当前消息处理完成后退出
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "监听关闭信号失败");
            return;
        }
        info!("收到 Ctrl+C，准备关闭");
        let _ = shutdown_tx.send(true);
    });

    let result = consumer.start(&amqp, &config.amqp, shutdown_rx).await;

    if let Err(e) = amqp.close().await {
        warn!(error = %e, "关闭 AMQP 通道失败");
    }
    db.close().await;

    result?;
    info!("alert-worker stopped");
    Ok(())
}
