//! 请求与响应 DTO

pub mod request;
pub mod response;

pub use request::{CreateOrderRequest, MarkOrderFailedRequest, VerifyPaymentRequest};
pub use response::{ApiResponse, RefundResponse, VerifyPaymentResponse, WebhookAck};
