//! 航班搜索链接生成
//!
//! 用例只依赖 `LinkGenerator` trait；生成过程必须是纯函数且不会失败，
//! 任何兜底逻辑都放在实现内部。

use alert_shared::config::DEFAULT_LINK_BASE_URL;
use chrono::NaiveDate;
use tracing::warn;
use url::{Url, form_urlencoded};

/// 航班搜索链接生成器
#[cfg_attr(test, mockall::automock)]
pub trait LinkGenerator: Send + Sync {
    fn generate(
        &self,
        origin: &str,
        destination: &str,
        outbound_date: NaiveDate,
        return_date: NaiveDate,
    ) -> String;
}

/// Google Flights 链接生成器
pub struct GoogleFlightsLinkGenerator {
    base_url: String,
}

impl GoogleFlightsLinkGenerator {
    /// base_url 为空或不是合法 URL 时使用默认地址
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');

        let base_url = match Url::parse(trimmed) {
            Ok(_) => trimmed.to_string(),
            Err(e) => {
                if !trimmed.is_empty() {
                    warn!(base_url = trimmed, error = %e, "链接基础地址无效，使用默认地址");
                }
                DEFAULT_LINK_BASE_URL.to_string()
            }
        };
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for GoogleFlightsLinkGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_BASE_URL)
    }
}

impl LinkGenerator for GoogleFlightsLinkGenerator {
    fn generate(
        &self,
        origin: &str,
        destination: &str,
        outbound_date: NaiveDate,
        return_date: NaiveDate,
    ) -> String {
        let query = format!(
            "Flights to {} from {} on {} through {}",
            destination.trim(),
            origin.trim(),
            outbound_date.format("%Y-%m-%d"),
            return_date.format("%Y-%m-%d"),
        );

        // form 编码会把字面量 '+' 转成 %2B，剩下的 '+' 都来自空格
        let encoded: String = form_urlencoded::byte_serialize(query.as_bytes())
            .collect::<String>()
            .replace('+', "%20");

        match Url::parse(&self.base_url) {
            Ok(mut url) => {
                url.set_query(Some(&format!("q={encoded}")));
                url.into()
            }
            Err(_) => format!("{}?q={}", self.base_url, encoded),
        }
    }
}
