use crate::Result;
use async_trait::async_trait;

/// Outbound publish primitive of the broker connection.
///
/// Delivery is best effort: implementations publish at most once and never retry.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Short backend name for logs (e.g. "mqtt", "mock").
    fn name(&self) -> &str;

    /// Publish one payload on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Close the broker session if the backend has one.
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}
