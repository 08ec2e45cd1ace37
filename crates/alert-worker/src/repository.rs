//! 收件人仓储
//!
//! 根据告警 ID 查询订阅者邮箱。用例只依赖 trait，便于用 mock 替换存储实现。

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{AlertError, Result};

/// 收件人仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipientRepository: Send + Sync {
    /// 查询告警所属用户的联系地址
    ///
    /// 记录不存在返回 `RecipientNotFound`，其余存储错误原样返回 `Database`。
    async fn recipient_address(&self, alert_id: i64) -> Result<String>;
}

/// 基于 PostgreSQL 的收件人仓储
pub struct PgRecipientRepository {
    pool: PgPool,
}

impl PgRecipientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientRepository for PgRecipientRepository {
    async fn recipient_address(&self, alert_id: i64) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE alert_id = $1")
            .bind(alert_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_lookup_error(alert_id, e))
    }
}

fn map_lookup_error(alert_id: i64, err: sqlx::Error) -> AlertError {
    match err {
        sqlx::Error::RowNotFound => AlertError::RecipientNotFound { alert_id },
        other => AlertError::Database(other),
    }
}
