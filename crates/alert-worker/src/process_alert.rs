//! 价格告警用例
//!
//! 对一条已解码的价格更新依次执行：生成链接 -> 查询收件人 -> 组装通知 -> 发送。
//! 步骤严格顺序执行，前一步失败后一步不会开始；发送是最后一步，
//! 因此任何失败都不会产生通知。

use std::sync::Arc;

use alert_shared::observability::metrics;
use tracing::{debug, info};

use crate::error::Result;
use crate::link::LinkGenerator;
use crate::models::AlertUpdate;
use crate::repository::RecipientRepository;
use crate::sender::NotificationSender;
use crate::templates::PriceAlertTemplate;

/// 价格告警用例
///
/// 三个协作者都以 trait 对象注入，连接生命周期由调用方负责。
pub struct ProcessAlert {
    link_generator: Arc<dyn LinkGenerator>,
    repository: Arc<dyn RecipientRepository>,
    sender: Arc<dyn NotificationSender>,
}

impl ProcessAlert {
    pub fn new(
        link_generator: Arc<dyn LinkGenerator>,
        repository: Arc<dyn RecipientRepository>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            link_generator,
            repository,
            sender,
        }
    }

    /// 执行用例
    ///
    /// 收件人查询和发送的错误原样返回，不做包装也不重试。
    pub async fn execute(&self, update: AlertUpdate) -> Result<()> {
        let link = self.link_generator.generate(
            &update.origin,
            &update.destination,
            update.outbound_date,
            update.return_date,
        );
        let update = update.with_link(link);

        debug!(alert_id = update.alert_id, link = %update.link, "已生成搜索链接");

        let recipient = self.repository.recipient_address(update.alert_id).await?;

        let notification = PriceAlertTemplate::render(&recipient, &update);

        self.sender
            .send(&notification.to, &notification.subject, &notification.body)
            .await?;

        metrics::record_notification_sent();
        info!(
            message_id = %update.message_id,
            alert_id = update.alert_id,
            new_price = update.new_price,
            currency = %update.currency,
            "价格告警通知已发送"
        );

        Ok(())
    }
}
