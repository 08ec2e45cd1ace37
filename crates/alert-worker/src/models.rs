//! 领域模型

use chrono::{DateTime, NaiveDate, Utc};

/// 一次价格检查事件
///
/// 解码后除 `link` 外不再修改；`link` 由用例在发送通知前写入一次。
#[derive(Debug, Clone, PartialEq)]
pub struct AlertUpdate {
    /// 关联 ID，只用于日志
    pub message_id: String,
    /// 告警 ID，指向拥有该告警的订阅者
    pub alert_id: i64,
    pub origin: String,
    pub destination: String,
    pub outbound_date: NaiveDate,
    pub return_date: NaiveDate,
    pub old_price: f64,
    pub new_price: f64,
    pub target_price: f64,
    pub tolerance_up: f64,
    pub currency: String,
    pub checked_at: DateTime<Utc>,
    pub link: String,
}

impl AlertUpdate {
    /// 写入航班搜索链接
    pub fn with_link(self, link: String) -> Self {
        Self { link, ..self }
    }
}

/// 待发送的通知
///
/// 每次执行临时构造，不持久化，也不在告警之间复用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}
