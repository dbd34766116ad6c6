use crate::{BridgeConfig, BridgeMetrics, Dispatcher, LineListener, LinePipeline, Result};
use broker_transport::Publisher;
use device_registry::DeviceRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A bound bridge: listener, pipeline and registry wired to one publisher.
pub struct Bridge {
    metrics: BridgeMetrics,
    registry: Arc<DeviceRegistry>,
    publisher: Arc<dyn Publisher>,
    listener: LineListener,
}

impl Bridge {
    pub async fn bind(config: &BridgeConfig, publisher: Arc<dyn Publisher>) -> Result<Self> {
        config.validate()?;
        let metrics = BridgeMetrics::new()?;
        let registry = Arc::new(DeviceRegistry::new());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            publisher.clone(),
            config.mqtt.topics.clone(),
            metrics.clone(),
        );
        let pipeline = LinePipeline::new(dispatcher, metrics.clone());
        let listener = LineListener::bind(&config.listen, pipeline, metrics.clone()).await?;
        info!(
            listen = %config.listen.addr(),
            publisher = publisher.name(),
            "bridge ready"
        );
        Ok(Self {
            metrics,
            registry,
            publisher,
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Accept tracker connections until the future is dropped.
    pub async fn run(&self) {
        self.listener.run().await
    }

    /// Disconnect from the broker, waiting at most `timeout`. In-flight line tasks are not
    /// awaited.
    pub async fn shutdown(&self, timeout: Duration) {
        match tokio::time::timeout(timeout, self.publisher.disconnect()).await {
            Ok(Ok(())) => info!(publisher = self.publisher.name(), "disconnected from broker"),
            Ok(Err(e)) => warn!(error = %e, "broker disconnect failed"),
            Err(_) => warn!(?timeout, "broker disconnect timed out"),
        }
        info!(
            devices = self.registry.len(),
            summary = %self.metrics.summary(),
            "bridge stopped"
        );
        match self.metrics.encode_text() {
            Ok(text) => debug!("final metrics:\n{text}"),
            Err(e) => warn!(error = %e, "encoding final metrics failed"),
        }
    }
}
