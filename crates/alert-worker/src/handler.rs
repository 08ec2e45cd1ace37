//! 单条消息处理
//!
//! 解码 -> 用例，任意阶段的错误原样返回给消费循环。

use std::sync::Arc;

use crate::error::Result;
use crate::payload;
use crate::process_alert::ProcessAlert;

/// 消息处理器
///
/// 无状态，可在多个消费任务之间共享。
#[derive(Clone)]
pub struct MessageHandler {
    use_case: Arc<ProcessAlert>,
}

impl MessageHandler {
    pub fn new(use_case: Arc<ProcessAlert>) -> Self {
        Self { use_case }
    }

    /// 处理一条原始消息
    ///
    /// 解码失败时直接返回，不会调用用例。
    pub async fn handle(&self, body: &[u8]) -> Result<()> {
        let update = payload::decode(body)?;
        self.use_case.execute(update).await
    }
}
