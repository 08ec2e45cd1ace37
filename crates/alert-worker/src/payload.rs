//! 价格更新消息解码
//!
//! 把队列里的原始字节转换为校验过的 `AlertUpdate`。
//! 纯函数：不访问数据库、不发邮件，相同输入总是得到相同结果。

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::{AlertError, Result};
use crate::models::AlertUpdate;

/// 日期字段的唯一合法格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 线上传输的价格更新消息（JSON，camelCase 字段）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdatedPayload {
    #[serde(default)]
    pub message_id: String,
    pub alert_id: i64,
    pub origin: String,
    pub destination: String,
    pub outbound_date: String,
    pub return_date: String,
    pub old_price: f64,
    pub new_price: f64,
    pub currency: String,
    pub target_price: f64,
    #[serde(default)]
    pub tolerance_up: f64,
    pub checked_at: DateTime<Utc>,
}

impl PriceUpdatedPayload {
    /// 转换为领域模型
    ///
    /// 先解析出发日期，失败时直接返回，不再尝试返程日期；
    /// 两个日期都合法后才校验其余字段。
    pub fn into_domain(self) -> Result<AlertUpdate> {
        let outbound_date =
            parse_date(&self.outbound_date).map_err(|source| AlertError::InvalidOutboundDate {
                value: self.outbound_date.clone(),
                source,
            })?;

        let return_date =
            parse_date(&self.return_date).map_err(|source| AlertError::InvalidReturnDate {
                value: self.return_date.clone(),
                source,
            })?;

        self.validate()?;

        Ok(AlertUpdate {
            message_id: self.message_id,
            alert_id: self.alert_id,
            origin: self.origin,
            destination: self.destination,
            outbound_date,
            return_date,
            old_price: self.old_price,
            new_price: self.new_price,
            target_price: self.target_price,
            tolerance_up: self.tolerance_up,
            currency: self.currency,
            checked_at: self.checked_at,
            link: String::new(),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.origin.trim().is_empty() {
            return Err(AlertError::Malformed("origin 不能为空".to_string()));
        }
        if self.destination.trim().is_empty() {
            return Err(AlertError::Malformed("destination 不能为空".to_string()));
        }

        let prices = [
            ("oldPrice", self.old_price),
            ("newPrice", self.new_price),
            ("targetPrice", self.target_price),
        ];
        for (field, value) in prices {
            if value < 0.0 {
                return Err(AlertError::Malformed(format!("{field} 不能为负数: {value}")));
            }
        }

        Ok(())
    }
}

/// 解码消息体
pub fn decode(body: &[u8]) -> Result<AlertUpdate> {
    let payload: PriceUpdatedPayload =
        serde_json::from_slice(body).map_err(|e| AlertError::Malformed(e.to_string()))?;

    payload.into_domain()
}

/// 按 YYYY-MM-DD 解析日期
///
/// chrono 的 `%m`/`%d` 接受一位数字，所以先做形状检查：
/// 形状不对返回 `Err(None)`，形状对但日期非法返回 chrono 的解析错误。
fn parse_date(value: &str) -> std::result::Result<NaiveDate, Option<chrono::ParseError>> {
    if !has_date_shape(value) {
        return Err(None);
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(Some)
}

fn has_date_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_body() -> serde_json::Value {
        json!({
            "messageId": "msg-123",
            "alertId": 1,
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

    fn decode_json(value: &serde_json::Value) -> Result<AlertUpdate> {
        decode(&serde_json::to_vec(value).expect("序列化测试消息失败"))
    }

    #[test]
    fn test_decode_success() {
        let update = decode_json(&valid_body()).expect("合法消息应解码成功");

        assert_eq!(update.message_id, "msg-123");
        assert_eq!(update.alert_id, 1);
        assert_eq!(update.origin, "GRU");
        assert_eq!(update.destination, "JFK");
        assert_eq!(update.old_price, 1500.00);
        assert_eq!(update.new_price, 1200.00);
        assert_eq!(update.currency, "BRL");
        assert_eq!(update.target_price, 1000.00);
        assert_eq!(update.tolerance_up, 100.00);
        assert_eq!(
            update.outbound_date,
            NaiveDate::from_ymd_opt(2025, 12, 15).unwrap()
        );
        assert_eq!(
            update.return_date,
            NaiveDate::from_ymd_opt(2025, 12, 20).unwrap()
        );
        assert_eq!(update.checked_at.to_rfc3339(), "2025-12-02T10:00:00+00:00");
        assert!(update.link.is_empty());
    }

    #[test]
    fn test_decode_is_deterministic() {
        let body = serde_json::to_vec(&valid_body()).unwrap();
        assert_eq!(decode(&body).unwrap(), decode(&body).unwrap());
    }

    #[test]
    fn test_decode_optional_fields_default() {
        let mut body = valid_body();
        let obj = body.as_object_mut().unwrap();
        obj.remove("toleranceUp");
        obj.remove("messageId");

        let update = decode_json(&body).unwrap();
        assert_eq!(update.tolerance_up, 0.0);
        assert!(update.message_id.is_empty());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let mut body = valid_body();
        body["carrier"] = json!("LA");
        assert!(decode_json(&body).is_ok());
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode(br#"{"invalid json}"#).unwrap_err();
        assert!(matches!(err, AlertError::Malformed(_)));
    }

    #[test]
    fn test_decode_missing_required_field() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("alertId");
        assert!(matches!(
            decode_json(&body).unwrap_err(),
            AlertError::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_invalid_checked_at() {
        let mut body = valid_body();
        body["checkedAt"] = json!("yesterday");
        assert!(matches!(
            decode_json(&body).unwrap_err(),
            AlertError::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_invalid_outbound_date() {
        let mut body = valid_body();
        body["outboundDate"] = json!("invalid-date");

        let err = decode_json(&body).unwrap_err();
        assert!(
            matches!(err, AlertError::InvalidOutboundDate { ref value, .. } if value == "invalid-date")
        );
    }

    #[test]
    fn test_outbound_failure_short_circuits_return_date() {
        // 两个日期都非法时只报告出发日期
        let mut body = valid_body();
        body["outboundDate"] = json!("invalid-date");
        body["returnDate"] = json!("also-invalid");

        let err = decode_json(&body).unwrap_err();
        assert!(matches!(err, AlertError::InvalidOutboundDate { .. }));
    }

    #[test]
    fn test_decode_invalid_return_date() {
        let mut body = valid_body();
        body["returnDate"] = json!("invalid-date");

        let err = decode_json(&body).unwrap_err();
        assert!(matches!(err, AlertError::InvalidReturnDate { .. }));
    }

    #[test]
    fn test_decode_wrong_date_format() {
        let mut body = valid_body();
        body["outboundDate"] = json!("15/12/2025");
        body["returnDate"] = json!("20/12/2025");

        assert!(matches!(
            decode_json(&body).unwrap_err(),
            AlertError::InvalidOutboundDate { source: None, .. }
        ));
    }

    #[test]
    fn test_decode_rejects_unpadded_and_timestamped_dates() {
        for value in ["2025-1-5", "2025-12-15T00:00:00Z", " 2025-12-15", "20251215"] {
            let mut body = valid_body();
            body["outboundDate"] = json!(value);
            assert!(
                matches!(
                    decode_json(&body).unwrap_err(),
                    AlertError::InvalidOutboundDate { .. }
                ),
                "{value} 不应被接受"
            );
        }
    }

    #[test]
    fn test_decode_impossible_calendar_date_keeps_cause() {
        let mut body = valid_body();
        body["returnDate"] = json!("2025-02-30");

        assert!(matches!(
            decode_json(&body).unwrap_err(),
            AlertError::InvalidReturnDate {
                source: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_decode_empty_location_is_malformed() {
        let mut body = valid_body();
        body["destination"] = json!("  ");
        assert!(matches!(
            decode_json(&body).unwrap_err(),
            AlertError::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_negative_price_is_malformed() {
        let mut body = valid_body();
        body["newPrice"] = json!(-1.0);
        assert!(matches!(
            decode_json(&body).unwrap_err(),
            AlertError::Malformed(_)
        ));
    }
}
