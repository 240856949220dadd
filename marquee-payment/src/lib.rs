pub mod error;
pub mod gateway;
pub mod orchestrator;

pub use error::PaymentError;
pub use gateway::MockGateway;
pub use orchestrator::{
    CreatePaymentRequest, CreatePaymentResponse, PaymentOrchestrator, WebhookPayload,
    WebhookResponse, WebhookStatus,
};
