//! 价格告警消费者
//!
//! 从队列逐条拉取投递，交给 `MessageHandler` 处理，并把处理结果转换为
//! broker 的确认信号：成功 accept，失败 reject 且不重新入队。
//! 同一时刻只有一条在途消息，关闭信号只在两条投递之间生效。

use std::time::Instant;

use alert_shared::amqp::{AmqpConnection, Delivery};
use alert_shared::config::AmqpConfig;
use alert_shared::error::InfraError;
use alert_shared::observability::metrics;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::handler::MessageHandler;

/// 单条投递的处理结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Accepted,
    Rejected,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

/// 价格告警消费者
pub struct AlertConsumer {
    handler: MessageHandler,
}

impl AlertConsumer {
    pub fn new(handler: MessageHandler) -> Self {
        Self { handler }
    }

    /// 以手动确认模式订阅配置的队列，运行到流结束或收到关闭信号
    pub async fn start(
        &self,
        connection: &AmqpConnection,
        config: &AmqpConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let deliveries = connection
            .subscribe(&config.queue, &config.consumer_tag)
            .await?;

        info!(queue = %config.queue, "价格告警消费者已启动");
        self.run(deliveries, shutdown).await;
        info!(queue = %config.queue, "价格告警消费者已停止");

        Ok(())
    }

    /// 消费循环
    ///
    /// 与 broker 无关，任何产出 `Delivery` 的流都可以驱动。
    pub async fn run<S, D>(&self, deliveries: S, mut shutdown: watch::Receiver<bool>)
    where
        S: Stream<Item = std::result::Result<D, InfraError>>,
        D: Delivery,
    {
        if *shutdown.borrow() {
            info!("启动前已收到关闭信号，消费循环不运行");
            return;
        }

        futures::pin_mut!(deliveries);

        // 发送端被丢弃后不再监听关闭信号，只等流结束
        let mut watching = true;

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed(), if watching => {
                    match changed {
                        Ok(()) if *shutdown.borrow() => {
                            info!("收到关闭信号，消费循环退出");
                            break;
                        }
                        Ok(()) => {}
                        Err(_) => watching = false,
                    }
                }

                next = deliveries.next() => {
                    let Some(next) = next else {
                        warn!("投递流已结束，消费循环退出");
                        break;
                    };

                    match next {
                        Ok(delivery) => {
                            process_delivery(&self.handler, &delivery).await;
                        }
                        Err(e) => {
                            error!(error = %e, "接收投递出错");
                        }
                    }
                }
            }
        }
    }
}

/// 处理单条投递并发送确认信号
///
/// 拆分为独立函数，测试中可以直接驱动一条投递。
/// 确认信号发送失败只记录日志，broker 会在连接恢复后重新投递。
pub async fn process_delivery<D: Delivery>(
    handler: &MessageHandler,
    delivery: &D,
) -> DeliveryOutcome {
    let started = Instant::now();
    let message_id = delivery.message_id().unwrap_or("-");
    let delivery_tag = delivery.delivery_tag();

    info!(
        message_id,
        delivery_tag,
        redelivered = delivery.redelivered(),
        bytes = delivery.body().len(),
        "收到投递"
    );

    let outcome = match handler.handle(delivery.body()).await {
        Ok(()) => {
            if let Err(e) = delivery.accept().await {
                error!(message_id, delivery_tag, error = %e, "确认投递失败");
            } else {
                info!(message_id, delivery_tag, "投递已确认");
            }
            DeliveryOutcome::Accepted
        }
        Err(e) => {
            warn!(
                message_id,
                delivery_tag,
                code = e.code(),
                retryable = e.is_retryable(),
                error = %e,
                "处理投递失败，拒绝且不重新入队"
            );
            if let Err(e) = delivery.reject(false).await {
                error!(message_id, delivery_tag, error = %e, "拒绝投递失败");
            }
            DeliveryOutcome::Rejected
        }
    };

    metrics::record_delivery(outcome.as_str(), started.elapsed().as_secs_f64());
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream;
    use tokio::sync::Notify;

    use super::*;
    use crate::process_alert::ProcessAlert;
    use crate::sender::NotificationSender;
    use crate::test_utils::{
        FakeDelivery, FixedLinkGenerator, RecordingSender, StaticRecipients, price_update_json,
        to_body,
    };

    fn handler_with(sender: Arc<RecordingSender>) -> MessageHandler {
        let use_case = ProcessAlert::new(
            Arc::new(FixedLinkGenerator("https://flights.example.com".to_string())),
            Arc::new(StaticRecipients::default().with(1, "user@example.com")),
            sender,
        );
        MessageHandler::new(Arc::new(use_case))
    }

    /// 发送开始时通知 `entered`，然后阻塞直到 `release`
    struct GatedSender {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl NotificationSender for GatedSender {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> crate::error::Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_accepts_exactly_once() {
        let sender = Arc::new(RecordingSender::default());
        let handler = handler_with(sender.clone());
        let (delivery, log) = FakeDelivery::new(1, to_body(&price_update_json(1)));

        let outcome = process_delivery(&handler, &delivery).await;

        assert_eq!(outcome, DeliveryOutcome::Accepted);
        assert_eq!(log.accept_count(), 1);
        assert!(log.rejects().is_empty());
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_rejects_without_requeue() {
        let sender = Arc::new(RecordingSender::default());
        let handler = handler_with(sender.clone());
        let (delivery, log) = FakeDelivery::new(1, b"{not json".to_vec());

        let outcome = process_delivery(&handler, &delivery).await;

        assert_eq!(outcome, DeliveryOutcome::Rejected);
        assert_eq!(log.accept_count(), 0);
        assert_eq!(log.rejects(), vec![false]);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_use_case_failure_rejects_without_requeue() {
        let sender = Arc::new(RecordingSender::default());
        let handler = handler_with(sender.clone());
        // alert 99 没有收件人
        let (delivery, log) = FakeDelivery::new(1, to_body(&price_update_json(99)));

        let outcome = process_delivery(&handler, &delivery).await;

        assert_eq!(outcome, DeliveryOutcome::Rejected);
        assert_eq!(log.accept_count(), 0);
        assert_eq!(log.rejects(), vec![false]);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_signal_does_not_change_outcome() {
        let handler = handler_with(Arc::new(RecordingSender::default()));
        let (delivery, log) = FakeDelivery::new(1, to_body(&price_update_json(1)));
        let delivery = delivery.failing_signal();

        let outcome = process_delivery(&handler, &delivery).await;

        assert_eq!(outcome, DeliveryOutcome::Accepted);
        assert_eq!(log.accept_count(), 1);
    }

    #[tokio::test]
    async fn test_run_processes_each_delivery_in_order() {
        let sender = Arc::new(RecordingSender::default());
        let consumer = AlertConsumer::new(handler_with(sender.clone()));

        let (ok, ok_log) = FakeDelivery::new(1, to_body(&price_update_json(1)));
        let (bad, bad_log) = FakeDelivery::new(2, b"[]".to_vec());
        let (missing, missing_log) = FakeDelivery::new(3, to_body(&price_update_json(7)));

        let deliveries = stream::iter(vec![
            Ok(ok),
            Err(InfraError::Amqp("frame error".to_string())),
            Ok(bad),
            Ok(missing),
        ]);
        let (_tx, rx) = watch::channel(false);

        consumer.run(deliveries, rx).await;

        assert_eq!(ok_log.accept_count(), 1);
        assert!(ok_log.rejects().is_empty());
        assert_eq!(bad_log.accept_count(), 0);
        assert_eq!(bad_log.rejects(), vec![false]);
        assert_eq!(missing_log.accept_count(), 0);
        assert_eq!(missing_log.rejects(), vec![false]);
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_run_skips_when_already_shut_down() {
        let consumer = AlertConsumer::new(handler_with(Arc::new(RecordingSender::default())));
        let (delivery, log) = FakeDelivery::new(1, to_body(&price_update_json(1)));
        let (_tx, rx) = watch::channel(true);

        consumer.run(stream::iter(vec![Ok(delivery)]), rx).await;

        assert_eq!(log.accept_count(), 0);
        assert!(log.rejects().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let consumer = AlertConsumer::new(handler_with(Arc::new(RecordingSender::default())));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            consumer
                .run(stream::pending::<std::result::Result<FakeDelivery, InfraError>>(), rx)
                .await;
        });

        tx.send(true).unwrap();

        let joined = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn test_run_keeps_draining_after_sender_dropped() {
        let sender = Arc::new(RecordingSender::default());
        let consumer = AlertConsumer::new(handler_with(sender.clone()));
        let (delivery, log) = FakeDelivery::new(1, to_body(&price_update_json(1)));
        let (tx, rx) = watch::channel(false);
        drop(tx);

        consumer.run(stream::iter(vec![Ok(delivery)]), rx).await;

        assert_eq!(log.accept_count(), 1);
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_message_is_processed_normally() {
        let handler = handler_with(Arc::new(RecordingSender::default()));
        let (delivery, log) = FakeDelivery::new(1, to_body(&price_update_json(1)));
        let delivery = delivery.as_redelivery();

        let outcome = process_delivery(&handler, &delivery).await;

        assert_eq!(outcome, DeliveryOutcome::Accepted);
        assert_eq!(log.accept_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_delivery() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let sender = Arc::new(GatedSender {
            entered: entered.clone(),
            release: release.clone(),
            sent: AtomicUsize::new(0),
        });
        let use_case = ProcessAlert::new(
            Arc::new(FixedLinkGenerator("https://flights.example.com".to_string())),
            Arc::new(StaticRecipients::default().with(1, "user@example.com")),
            sender.clone(),
        );
        let consumer = AlertConsumer::new(MessageHandler::new(Arc::new(use_case)));

        let (first, first_log) = FakeDelivery::new(1, to_body(&price_update_json(1)));
        let (queued, queued_log) = FakeDelivery::new(2, to_body(&price_update_json(1)));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            consumer
                .run(stream::iter(vec![Ok::<_, InfraError>(first), Ok(queued)]), rx)
                .await;
        });

        // 第一条投递已进入发送阶段
        entered.notified().await;
        tx.send(true).unwrap();
        release.notify_one();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("消费循环应在当前投递完成后退出")
            .unwrap();

        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);
        assert_eq!(first_log.accept_count(), 1);
        assert!(first_log.rejects().is_empty());
        assert_eq!(queued_log.accept_count(), 0);
        assert!(queued_log.rejects().is_empty());
    }
}
