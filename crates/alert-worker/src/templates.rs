//! 通知模板
//!
//! 标题固定，正文插入新价格（保留两位小数）、币种和搜索链接。
//! 当前使用硬编码模板，未来可扩展为按用户语言加载。

use crate::models::{AlertUpdate, Notification};

/// 价格告警邮件标题
pub const PRICE_ALERT_SUBJECT: &str = "Price Alert Updated";

/// 价格告警模板
pub struct PriceAlertTemplate;

impl PriceAlertTemplate {
    /// 标题保持固定，便于邮件客户端聚合同类通知
    pub fn render_subject() -> String {
        PRICE_ALERT_SUBJECT.to_string()
    }

    pub fn render_body(update: &AlertUpdate) -> String {
        format!(
            "The price of your alert has been updated. New price: {:.2} {}. Link: {}",
            update.new_price, update.currency, update.link
        )
    }

    /// 组装发送给收件人的完整通知
    pub fn render(recipient: &str, update: &AlertUpdate) -> Notification {
        Notification {
            to: recipient.to_string(),
            subject: Self::render_subject(),
            body: Self::render_body(update),
        }
    }
}
