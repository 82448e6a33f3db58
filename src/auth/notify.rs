use async_trait::async_trait;
use tracing::info;

/// Outcome of handing an OTP to a delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Sent out of band; the code must not appear in the response.
    Dispatched,
    /// No channel; the caller echoes the code back to the client.
    Loopback(String),
}

#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn deliver(&self, phone: &str, code: &str) -> anyhow::Result<Delivery>;
}

/// Returns the code to the caller instead of sending it anywhere.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNotifier;

#[async_trait]
impl OtpNotifier for LoopbackNotifier {
    async fn deliver(&self, phone: &str, code: &str) -> anyhow::Result<Delivery> {
        info!(%phone, "otp delivery: loopback");
        Ok(Delivery::Loopback(code.to_string()))
    }
}
