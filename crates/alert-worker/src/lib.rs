//! 价格告警通知服务
//!
//! 从消息队列消费机票价格变动事件，解析出告警、查询订阅者邮箱并发送提醒邮件。
//! 每条投递处理完成后显式确认，处理失败的投递被拒绝且不重新入队。

pub mod consumer;
pub mod error;
pub mod handler;
pub mod link;
pub mod models;
pub mod payload;
pub mod process_alert;
pub mod repository;
pub mod sender;
pub mod templates;
pub mod test_utils;
