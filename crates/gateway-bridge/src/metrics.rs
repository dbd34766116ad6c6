use crate::Result;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct BridgeMetrics {
    pub registry: Registry,
    pub lines_received: IntCounter,
    pub lines_dropped: IntCounter,
    pub records_decoded: IntCounter,
    pub announcements_published: IntCounter,
    pub telemetry_published: IntCounter,
    pub publish_failures: IntCounter,
    pub connections_open: IntGauge,
    pub devices_announced: IntGauge,
}

impl BridgeMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let lines_received =
            IntCounter::new("gtpl_lines_received", "Total tracker lines received")?;
        let lines_dropped = IntCounter::new(
            "gtpl_lines_dropped",
            "Lines that yielded no record or exceeded the line limit",
        )?;
        let records_decoded =
            IntCounter::new("gtpl_records_decoded", "Total telemetry records decoded")?;
        let announcements_published = IntCounter::new(
            "gtpl_announcements_published",
            "Device connect announcements published",
        )?;
        let telemetry_published =
            IntCounter::new("gtpl_telemetry_published", "Telemetry envelopes published")?;
        let publish_failures =
            IntCounter::new("gtpl_publish_failures", "Broker publishes that failed")?;
        let connections_open =
            IntGauge::new("gtpl_connections_open", "Tracker connections currently open")?;
        let devices_announced =
            IntGauge::new("gtpl_devices_announced", "Devices announced to the broker")?;

        registry.register(Box::new(lines_received.clone()))?;
        registry.register(Box::new(lines_dropped.clone()))?;
        registry.register(Box::new(records_decoded.clone()))?;
        registry.register(Box::new(announcements_published.clone()))?;
        registry.register(Box::new(telemetry_published.clone()))?;
        registry.register(Box::new(publish_failures.clone()))?;
        registry.register(Box::new(connections_open.clone()))?;
        registry.register(Box::new(devices_announced.clone()))?;

        Ok(Self {
            registry,
            lines_received,
            lines_dropped,
            records_decoded,
            announcements_published,
            telemetry_published,
            publish_failures,
            connections_open,
            devices_announced,
        })
    }

    /// Prometheus text exposition of every registered series.
    pub fn encode_text(&self) -> Result<String> {
        let mut buf = Vec::with_capacity(2048);
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()).into())
    }

    /// One-line summary for shutdown logs.
    pub fn summary(&self) -> String {
        format!(
            "lines={} dropped={} records={} announced={} telemetry={} failures={}",
            self.lines_received.get(),
            self.lines_dropped.get(),
            self.records_decoded.get(),
            self.announcements_published.get(),
            self.telemetry_published.get(),
            self.publish_failures.get(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_text_lists_all_series() {
        let metrics = BridgeMetrics::new().unwrap();
        metrics.lines_received.inc_by(3);
        metrics.connections_open.set(2);
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("gtpl_lines_received 3"));
        assert!(text.contains("gtpl_connections_open 2"));
        assert!(text.contains("gtpl_publish_failures 0"));
        assert!(text.contains("gtpl_devices_announced 0"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = BridgeMetrics::new().unwrap();
        let b = BridgeMetrics::new().unwrap();
        a.records_decoded.inc();
        assert_eq!(a.records_decoded.get(), 1);
        assert_eq!(b.records_decoded.get(), 0);
        assert!(a.summary().contains("records=1"));
    }
}
