//! 测试工具模块
//!
//! 提供可替换真实 broker / 数据库 / 邮件中继的内存实现和测试数据生成器，
//! 单元测试与 tests/ 下的集成测试共用。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alert_shared::amqp::Delivery;
use alert_shared::error::InfraError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Value, json};

use crate::error::{AlertError, Result};
use crate::link::LinkGenerator;
use crate::models::Notification;
use crate::repository::RecipientRepository;
use crate::sender::NotificationSender;

// ==================== 测试数据生成器 ====================

/// 生成一条合法的价格更新消息（GRU -> JFK，新价格 1200.00 BRL）
pub fn price_update_json(alert_id: i64) -> Value {
    json!({
        "messageId": format!("msg-{alert_id}"),
        "alertId": alert_id,
        "origin": "GRU",
        "destination": "JFK",
        "outboundDate": "2025-12-15",
        "returnDate": "2025-12-20",
        "oldPrice": 1500.00,
        "newPrice": 1200.00,
        "currency": "BRL",
        "targetPrice": 1000.00,
        "toleranceUp": 100.00,
        "checkedAt": "2025-12-02T10:00:00Z"
    })
}

/// 序列化为消息体字节
pub fn to_body(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

// ==================== 投递句柄 ====================

/// 记录一条投递收到的确认信号
#[derive(Debug, Default)]
pub struct DeliveryLog {
    accepts: AtomicUsize,
    rejects: Mutex<Vec<bool>>,
}

impl DeliveryLog {
    pub fn accept_count(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// 每次 reject 的 requeue 参数
    pub fn rejects(&self) -> Vec<bool> {
        self.rejects.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

/// 内存投递句柄
pub struct FakeDelivery {
    body: Vec<u8>,
    message_id: Option<String>,
    delivery_tag: u64,
    log: Arc<DeliveryLog>,
    redelivered: bool,
    fail_signal: bool,
}

impl FakeDelivery {
    pub fn new(delivery_tag: u64, body: Vec<u8>) -> (Self, Arc<DeliveryLog>) {
        let log = Arc::new(DeliveryLog::default());
        let delivery = Self {
            body,
            message_id: Some(format!("delivery-{delivery_tag}")),
            delivery_tag,
            log: Arc::clone(&log),
            redelivered: false,
            fail_signal: false,
        };
        (delivery, log)
    }

    /// 标记为 broker 重投
    pub fn as_redelivery(mut self) -> Self {
        self.redelivered = true;
        self
    }

    /// accept / reject 会被记录，但返回 broker 错误
    pub fn failing_signal(mut self) -> Self {
        self.fail_signal = true;
        self
    }

    fn signal_result(&self) -> std::result::Result<(), InfraError> {
        if self.fail_signal {
            Err(InfraError::Amqp("channel closed".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Delivery for FakeDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn accept(&self) -> std::result::Result<(), InfraError> {
        self.log.accepts.fetch_add(1, Ordering::SeqCst);
        self.signal_result()
    }

    async fn reject(&self, requeue: bool) -> std::result::Result<(), InfraError> {
        if let Ok(mut rejects) = self.log.rejects.lock() {
            rejects.push(requeue);
        }
        self.signal_result()
    }
}

// ==================== 协作者 ====================

/// 固定返回同一链接的生成器
pub struct FixedLinkGenerator(pub String);

impl LinkGenerator for FixedLinkGenerator {
    fn generate(&self, _: &str, _: &str, _: NaiveDate, _: NaiveDate) -> String {
        self.0.clone()
    }
}

/// 内存收件人表，查不到时返回 `RecipientNotFound`
#[derive(Default)]
pub struct StaticRecipients {
    addresses: HashMap<i64, String>,
}

impl StaticRecipients {
    pub fn with(mut self, alert_id: i64, address: &str) -> Self {
        self.addresses.insert(alert_id, address.to_string());
        self
    }
}

#[async_trait]
impl RecipientRepository for StaticRecipients {
    async fn recipient_address(&self, alert_id: i64) -> Result<String> {
        self.addresses
            .get(&alert_id)
            .cloned()
            .ok_or(AlertError::RecipientNotFound { alert_id })
    }
}

/// 记录所有发送请求的发送器
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Notification>>,
    fail_with: Option<String>,
}

impl RecordingSender {
    /// 每次发送都失败，但仍记录调用
    pub fn failing(reason: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(reason.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Notification {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }
        match &self.fail_with {
            Some(reason) => Err(AlertError::Dispatch(reason.clone())),
            None => Ok(()),
        }
    }
}
