//! AMQP 基础设施封装
//!
//! 将 lapin 的底层 API 封装为"投递句柄 + 投递流"两个抽象：
//! 消费方只需要拿到消息体，并在处理结束后调用 accept / reject，
//! 无需关心通道、delivery tag 等 broker 细节。

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use lapin::message::Delivery as LapinDelivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::info;

use crate::config::AmqpConfig;
use crate::error::InfraError;

/// 投递流：broker 推送的每条消息对应一个投递句柄
pub type DeliveryStream<D> = BoxStream<'static, Result<D, InfraError>>;

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// 单条投递的确认句柄
///
/// 确认语义绑定在每一条投递上，而不是全局的通道状态：
/// accept 只确认这一条，reject 只否认这一条（不做批量确认）。
#[async_trait]
pub trait Delivery: Send + Sync {
    /// 消息体原始字节
    fn body(&self) -> &[u8];

    /// 生产方设置的消息 ID，仅用于日志关联
    fn message_id(&self) -> Option<&str>;

    /// broker 分配的投递序号
    fn delivery_tag(&self) -> u64;

    /// 是否为 broker 的重投（此前曾投递过但未被确认）
    fn redelivered(&self) -> bool;

    /// 确认这一条投递
    async fn accept(&self) -> Result<(), InfraError>;

    /// 否认这一条投递；requeue 为 false 时 broker 不会再次投递给当前消费者
    async fn reject(&self, requeue: bool) -> Result<(), InfraError>;
}

// ---------------------------------------------------------------------------
// AmqpDelivery
// ---------------------------------------------------------------------------

/// lapin 投递的句柄实现
pub struct AmqpDelivery {
    inner: LapinDelivery,
}

impl AmqpDelivery {
    pub fn new(inner: LapinDelivery) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.inner.data
    }

    fn message_id(&self) -> Option<&str> {
        self.inner
            .properties
            .message_id()
            .as_ref()
            .map(|id| id.as_str())
    }

    fn delivery_tag(&self) -> u64 {
        self.inner.delivery_tag
    }

    fn redelivered(&self) -> bool {
        self.inner.redelivered
    }

    async fn accept(&self) -> Result<(), InfraError> {
        self.inner
            .acker
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(|e| InfraError::Amqp(format!("确认消息失败: {e}")))
    }

    async fn reject(&self, requeue: bool) -> Result<(), InfraError> {
        self.inner
            .acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map_err(|e| InfraError::Amqp(format!("否认消息失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// AmqpConnection
// ---------------------------------------------------------------------------

/// 进程级 AMQP 连接
///
/// 启动时建立一次，之后以引用形式传给消费者。
pub struct AmqpConnection {
    connection: Connection,
    channel: Channel,
    prefetch_count: u16,
}

impl AmqpConnection {
    /// 建立连接并打开一个通道
    pub async fn connect(config: &AmqpConfig) -> Result<Self, InfraError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| InfraError::Amqp(format!("连接 RabbitMQ 失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| InfraError::Amqp(format!("创建通道失败: {e}")))?;

        info!(prefetch_count = config.prefetch_count, "AMQP 连接已建立");
        Ok(Self {
            connection,
            channel,
            prefetch_count: config.prefetch_count,
        })
    }

    /// 以手动确认模式订阅队列
    ///
    /// `no_ack` 固定为 false：broker 会持有每条投递直到消费者显式 accept 或 reject。
    pub async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream<AmqpDelivery>, InfraError> {
        self.channel
            .basic_qos(self.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| InfraError::Amqp(format!("设置 prefetch 失败: {e}")))?;

        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| InfraError::Amqp(format!("订阅队列 {queue} 失败: {e}")))?;

        info!(queue, consumer_tag, "已订阅 AMQP 队列");

        Ok(consumer
            .map(|result| {
                result
                    .map(AmqpDelivery::new)
                    .map_err(|e| InfraError::Amqp(format!("接收消息出错: {e}")))
            })
            .boxed())
    }

    /// 先关闭通道再关闭连接，两者都以 200 正常关闭
    pub async fn close(&self) -> Result<(), InfraError> {
        self.channel.close(200, "bye").await?;
        self.connection.close(200, "bye").await?;
        info!("AMQP 连接已关闭");
        Ok(())
    }
}
