//! 支付签名校验
//!
//! 网关回调签名：`hex(HMAC-SHA256(key_secret, "{order_id}|{payment_id}"))`。
//! Webhook 签名：`hex(HMAC-SHA256(webhook_secret, raw_body))`。
//!
//! 比较使用 `Mac::verify_slice`（常数时间）。任何格式错误的输入都返回 `false`，不会 panic。

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 校验客户端回调签名
pub fn verify(order_id: &str, payment_id: &str, signature: &str, secret: &str) -> bool {
    if order_id.is_empty() || payment_id.is_empty() {
        return false;
    }
    verify_hex(&callback_payload(order_id, payment_id), signature, secret)
}

/// 校验 Webhook 签名（针对原始请求体）
pub fn verify_webhook(body: &[u8], signature: &str, webhook_secret: &str) -> bool {
    if body.is_empty() {
        return false;
    }
    verify_hex(body, signature, webhook_secret)
}

/// 计算回调签名（网关模拟与测试使用）
pub fn sign(order_id: &str, payment_id: &str, secret: &str) -> String {
    sign_hex(&callback_payload(order_id, payment_id), secret)
}

/// 计算 Webhook 签名
pub fn sign_webhook(body: &[u8], webhook_secret: &str) -> String {
    sign_hex(body, webhook_secret)
}

fn callback_payload(order_id: &str, payment_id: &str) -> Vec<u8> {
    format!("{}|{}", order_id, payment_id).into_bytes()
}

fn verify_hex(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    // verify_slice 对长度不符的签名同样返回 Err
    mac.verify_slice(&expected).is_ok()
}

fn sign_hex(payload: &[u8], secret: &str) -> String {
    // HMAC 接受任意长度的密钥，new_from_slice 不会失败
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
