use crate::{BridgeMetrics, Dispatcher};
use ais140_codec::{encode, records};
use tracing::debug;

/// Totals for one processed line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineOutcome {
    pub records: usize,
    pub announcements: usize,
    pub published: usize,
}

/// Decode → encode → dispatch for a single raw line.
#[derive(Clone)]
pub struct LinePipeline {
    dispatcher: Dispatcher,
    metrics: BridgeMetrics,
}

impl LinePipeline {
    pub fn new(dispatcher: Dispatcher, metrics: BridgeMetrics) -> Self {
        Self {
            dispatcher,
            metrics,
        }
    }

    /// Each record is dispatched as soon as its sub-message decodes.
    pub async fn process_line(&self, line: &str) -> LineOutcome {
        self.metrics.lines_received.inc();
        let mut outcome = LineOutcome::default();
        for record in records(line) {
            outcome.records += 1;
            self.metrics.records_decoded.inc();
            if record.packet_type.is_alert() {
                debug!(
                    device = %record.device_id,
                    alert = record.alert.as_deref().unwrap_or_default(),
                    "alert packet"
                );
            }
            let report = self.dispatcher.dispatch(encode(&record)).await;
            if report.announced && !report.announcement_failed {
                outcome.announcements += 1;
            }
            if report.telemetry_published {
                outcome.published += 1;
            }
        }
        if outcome.records == 0 {
            self.metrics.lines_dropped.inc();
            debug!(len = line.len(), "line yielded no records");
        }
        outcome
    }
}
