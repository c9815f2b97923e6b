//! 请求 DTO 定义

use serde::Deserialize;
use validator::Validate;

use studyhub_payment::OrderStatus;

/// 创建订单请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// 金额（最小货币单位）
    #[validate(range(min = 1, message = "金额必须大于 0"))]
    pub amount: i64,
    #[validate(length(equal = 3, message = "币种必须是三位 ISO 代码"))]
    pub currency: Option<String>,
    #[validate(length(max = 32, message = "推荐码过长"))]
    pub referral_code: Option<String>,
}

/// 支付验证请求（网关前端回调参数）
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 64, message = "网关订单号无效"))]
    pub gateway_order_id: String,
    #[validate(length(min = 1, max = 64, message = "支付 ID 无效"))]
    pub payment_id: String,
    #[validate(length(min = 1, max = 256, message = "签名无效"))]
    pub signature: String,
}

/// 支付失败 / 取消上报
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkOrderFailedRequest {
    #[validate(length(min = 1, max = 64, message = "网关订单号无效"))]
    pub gateway_order_id: String,
    pub status: OrderStatus,
    #[validate(length(max = 500, message = "失败原因不能超过 500 个字符"))]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_order_validation() {
        let valid: CreateOrderRequest =
            serde_json::from_str(r#"{"amount":49900,"currency":"INR","referralCode":"AB12CD"}"#).unwrap();
        assert!(valid.validate().is_ok());

        let minimal: CreateOrderRequest = serde_json::from_str(r#"{"amount":100}"#).unwrap();
        assert!(minimal.validate().is_ok());

        let zero: CreateOrderRequest = serde_json::from_str(r#"{"amount":0}"#).unwrap();
        assert!(zero.validate().is_err());

        let bad_currency: CreateOrderRequest =
            serde_json::from_str(r#"{"amount":100,"currency":"RUPEE"}"#).unwrap();
        assert!(bad_currency.validate().is_err());
    }

    #[test]
    fn test_verify_request_requires_all_fields() {
        let empty_signature: VerifyPaymentRequest = serde_json::from_str(
            r#"{"gatewayOrderId":"order_1","paymentId":"pay_1","signature":""}"#,
        )
        .unwrap();
        assert!(empty_signature.validate().is_err());

        assert!(
            serde_json::from_str::<VerifyPaymentRequest>(r#"{"gatewayOrderId":"order_1"}"#).is_err()
        );
    }

    #[test]
    fn test_mark_failed_status_parsing() {
        let req: MarkOrderFailedRequest = serde_json::from_str(
            r#"{"gatewayOrderId":"order_1","status":"cancelled","reason":"user closed"}"#,
        )
        .unwrap();
        assert_eq!(req.status, OrderStatus::Cancelled);
        assert!(req.validate().is_ok());
    }
}
