use crate::BridgeMetrics;
use ais140_codec::{encode_announcement, TelemetryEnvelope};
use broker_transport::{Publisher, Topics};
use device_registry::DeviceRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one [`Dispatcher::dispatch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// An announcement was attempted for this device.
    pub announced: bool,
    pub announcement_failed: bool,
    pub telemetry_published: bool,
}

/// Routes envelopes to the broker, announcing each device before its first telemetry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    publisher: Arc<dyn Publisher>,
    topics: Topics,
    metrics: BridgeMetrics,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        publisher: Arc<dyn Publisher>,
        topics: Topics,
        metrics: BridgeMetrics,
    ) -> Self {
        Self {
            registry,
            publisher,
            topics,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Publish failures are logged and counted, never returned.
    pub async fn dispatch(&self, envelope: TelemetryEnvelope) -> DispatchReport {
        let mut report = DispatchReport::default();
        let device_id = envelope.device_id().to_string();

        // Check and mark are separate lock acquisitions with a publish in between, so two
        // tasks seeing a new device together may both announce it. Broker connect is
        // idempotent.
        if !self.registry.is_announced(&device_id) {
            report.announced = true;
            let announcement = encode_announcement(&device_id);
            match self
                .publisher
                .publish(&self.topics.connect, announcement.into_bytes())
                .await
            {
                Ok(()) => {
                    debug!(device = %device_id, topic = %self.topics.connect, "device announced");
                    self.metrics.announcements_published.inc();
                }
                Err(e) => {
                    warn!(device = %device_id, error = %e, "announcement publish failed");
                    self.metrics.publish_failures.inc();
                    report.announcement_failed = true;
                }
            }
            self.registry.mark_announced(&device_id);
            self.metrics.devices_announced.set(self.registry.len() as i64);
        }

        match self
            .publisher
            .publish(&self.topics.telemetry, envelope.into_payload().into_bytes())
            .await
        {
            Ok(()) => {
                debug!(device = %device_id, topic = %self.topics.telemetry, "telemetry published");
                self.metrics.telemetry_published.inc();
                report.telemetry_published = true;
            }
            Err(e) => {
                warn!(device = %device_id, error = %e, "telemetry publish failed");
                self.metrics.publish_failures.inc();
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ais140_codec::{decode, encode};
    use async_trait::async_trait;
    use broker_transport::MockPublisher;
    use tokio::sync::Barrier;

    const STATUS: &str = "GTPL $1,867322035135813,A,290518,062804,18.709738,N,80.068397,E,0,406,309,11,0,14,1,0,26.4470#";

    fn envelope(line: &str) -> TelemetryEnvelope {
        let records = decode(line);
        assert_eq!(records.len(), 1);
        encode(&records[0])
    }

    fn dispatcher(publisher: Arc<dyn Publisher>) -> Dispatcher {
        Dispatcher::new(
            Arc::new(DeviceRegistry::new()),
            publisher,
            Topics::default(),
            BridgeMetrics::new().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_first_dispatch_announces_then_publishes() {
        let publisher = Arc::new(MockPublisher::new());
        let d = dispatcher(publisher.clone());

        let report = d.dispatch(envelope(STATUS)).await;
        assert!(report.announced);
        assert!(!report.announcement_failed);
        assert!(report.telemetry_published);

        let sent = publisher.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].topic, "v1/gateway/connect");
        assert_eq!(sent[0].payload_str(), r#"{"device": "867322035135813"}"#);
        assert_eq!(sent[1].topic, "v1/gateway/telemetry");
        assert_eq!(
            sent[1].payload_str(),
            r#"{"867322035135813":[{"ts":1527575284000,"values":{"lat":18.709738,"lng":80.068397,"speed":0,"box":false,"bat":true,"ign":false}}]}"#
        );
        assert!(d.registry().is_announced("867322035135813"));
    }

    #[tokio::test]
    async fn test_second_dispatch_skips_announcement() {
        let publisher = Arc::new(MockPublisher::new());
        let d = dispatcher(publisher.clone());

        d.dispatch(envelope(STATUS)).await;
        let report = d.dispatch(envelope(STATUS)).await;
        assert!(!report.announced);
        assert!(report.telemetry_published);
        assert_eq!(publisher.messages_on("v1/gateway/connect").len(), 1);
        assert_eq!(publisher.messages_on("v1/gateway/telemetry").len(), 2);
    }

    #[tokio::test]
    async fn test_distinct_devices_each_announced() {
        let publisher = Arc::new(MockPublisher::new());
        let d = dispatcher(publisher.clone());
        let other = STATUS.replace("867322035135813", "867322035135999");

        d.dispatch(envelope(STATUS)).await;
        d.dispatch(envelope(&other)).await;
        assert_eq!(publisher.messages_on("v1/gateway/connect").len(), 2);
        assert_eq!(
            d.registry().announced_devices(),
            vec!["867322035135813".to_string(), "867322035135999".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_announcement_still_marks_device() {
        let publisher = Arc::new(MockPublisher::new());
        publisher.fail_topic("v1/gateway/connect");
        let d = dispatcher(publisher.clone());

        let report = d.dispatch(envelope(STATUS)).await;
        assert!(report.announced);
        assert!(report.announcement_failed);
        assert!(report.telemetry_published);
        assert!(d.registry().is_announced("867322035135813"));

        let report = d.dispatch(envelope(STATUS)).await;
        assert!(!report.announced);
        assert_eq!(publisher.messages_on("v1/gateway/telemetry").len(), 2);
        assert_eq!(d.metrics.publish_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_telemetry_failure_is_reported_not_raised() {
        let publisher = Arc::new(MockPublisher::new());
        publisher.fail_topic("v1/gateway/telemetry");
        let d = dispatcher(publisher.clone());

        let report = d.dispatch(envelope(STATUS)).await;
        assert!(!report.telemetry_published);
        assert_eq!(d.metrics.telemetry_published.get(), 0);
        assert_eq!(d.metrics.publish_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_custom_topics() {
        let publisher = Arc::new(MockPublisher::new());
        let topics = Topics {
            connect: "gw/connect".into(),
            telemetry: "gw/telemetry".into(),
        };
        let d = Dispatcher::new(
            Arc::new(DeviceRegistry::new()),
            publisher.clone(),
            topics,
            BridgeMetrics::new().unwrap(),
        );
        d.dispatch(envelope(STATUS)).await;
        assert_eq!(publisher.messages_on("gw/connect").len(), 1);
        assert_eq!(publisher.messages_on("gw/telemetry").len(), 1);
    }

    /// Holds every connect publish until two have arrived.
    struct GatedPublisher {
        inner: MockPublisher,
        gate: Barrier,
    }

    #[async_trait]
    impl Publisher for GatedPublisher {
        fn name(&self) -> &str {
            "gated"
        }

        async fn publish(&self, topic: &str, payload: Vec<u8>) -> broker_transport::Result<()> {
            if topic == "v1/gateway/connect" {
                self.gate.wait().await;
            }
            self.inner.publish(topic, payload).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_dispatch_can_announce_twice() {
        let publisher = Arc::new(GatedPublisher {
            inner: MockPublisher::new(),
            gate: Barrier::new(2),
        });
        let d = dispatcher(publisher.clone());

        let (a, b) = tokio::join!(d.dispatch(envelope(STATUS)), d.dispatch(envelope(STATUS)));
        assert!(a.announced);
        assert!(b.announced);
        assert_eq!(publisher.inner.messages_on("v1/gateway/connect").len(), 2);
        assert_eq!(publisher.inner.messages_on("v1/gateway/telemetry").len(), 2);
        assert_eq!(d.registry().len(), 1);
    }
}
