use crate::{PublishedMessage, Publisher, Result, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

/// In-process publisher that records every message. Each instance is independent.
#[derive(Debug, Default)]
pub struct MockPublisher {
    sent: Mutex<Vec<PublishedMessage>>,
    failing_topics: Mutex<HashSet<String>>,
    disconnected: Mutex<bool>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish on `topic` fail with [`TransportError::Publish`].
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().insert(topic.to_string());
    }

    /// Everything published so far, in publish order.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.sent.lock().clone()
    }

    pub fn messages_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.lock()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if *self.disconnected.lock() {
            return Err(TransportError::Disconnected);
        }
        if self.failing_topics.lock().contains(topic) {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: "mock failure".to_string(),
            });
        }
        self.sent.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.disconnected.lock() = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_in_order() {
        let publisher = MockPublisher::new();
        publisher.publish("a", b"1".to_vec()).await.unwrap();
        publisher.publish("b", b"2".to_vec()).await.unwrap();
        publisher.publish("a", b"3".to_vec()).await.unwrap();

        let all = publisher.messages();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].topic, "b");
        let on_a: Vec<_> = publisher
            .messages_on("a")
            .iter()
            .map(|m| m.payload_str().to_string())
            .collect();
        assert_eq!(on_a, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_failing_topic() {
        let publisher = MockPublisher::new();
        publisher.fail_topic("down");
        let err = publisher.publish("down", Vec::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Publish { .. }));
        assert!(publisher.publish("up", Vec::new()).await.is_ok());
        assert_eq!(publisher.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_after_disconnect_fails() {
        let publisher = MockPublisher::new();
        publisher.disconnect().await.unwrap();
        assert!(publisher.is_disconnected());
        assert!(matches!(
            publisher.publish("t", Vec::new()).await,
            Err(TransportError::Disconnected)
        ));
    }
}
