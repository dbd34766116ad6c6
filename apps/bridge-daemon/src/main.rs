use anyhow::{Context, Result};
use broker_transport::{MqttPublisher, MqttSettings};
use clap::{ArgAction, Parser};
use gateway_bridge::{Bridge, BridgeConfig};
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "bridge-daemon", version)]
#[command(about = "Bridge GTPL vehicle trackers to a ThingsBoard MQTT gateway")]
struct Args {
    /// YAML config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address for tracker connections (HOST:PORT)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// MQTT broker URL, e.g. tcp://127.0.0.1:1883
    #[arg(long)]
    broker: Option<String>,

    /// Gateway access token, sent as the MQTT username
    #[arg(long)]
    access_token: Option<String>,

    /// MQTT client id
    #[arg(long)]
    client_id: Option<String>,

    /// Debug logging, including dropped lines
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(addr) = self.listen {
            config.listen.host = addr.ip().to_string();
            config.listen.port = addr.port();
        }
        if let Some(broker) = &self.broker {
            config.mqtt.broker_url = broker.clone();
        }
        if let Some(token) = &self.access_token {
            config.mqtt.access_token = Some(token.clone());
        }
        if let Some(client_id) = &self.client_id {
            config.mqtt.client_id = client_id.clone();
        }
        if self.verbose {
            config.logging.verbose = true;
        }
        if let Some(path) = &self.log_file {
            config.logging.file = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    setup_tracing(config.logging.verbose, config.logging.file.as_deref())?;
    info!("GTPL bridge starting");

    let broker = config.mqtt.broker()?;
    let mut settings = MqttSettings::new(broker, config.mqtt.client_id.clone());
    settings.access_token = config.mqtt.access_token.clone();
    settings.keep_alive = config.mqtt.keep_alive();
    settings.connect_timeout = config.mqtt.connect_timeout();
    if settings.access_token.is_none() {
        warn!("no access token configured; connecting anonymously");
    }

    let publisher = MqttPublisher::connect(&settings).await.with_context(|| {
        format!(
            "connecting to {}: is the MQTT broker up and running?",
            settings.broker
        )
    })?;

    let bridge = Bridge::bind(&config, Arc::new(publisher))
        .await
        .with_context(|| format!("binding {}", config.listen.addr()))?;

    tokio::select! {
        _ = bridge.run() => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for interrupt");
            }
            info!("interrupt received, shutting down");
        }
    }

    bridge.shutdown(DISCONNECT_TIMEOUT).await;
    Ok(())
}

/// `RUST_LOG` wins when set; otherwise `verbose` selects debug over info.
fn setup_tracing(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let _ = builder
                .with_ansi(false)
                .with_writer(std::io::stdout.and(Mutex::new(file)))
                .try_init();
        }
        None => {
            let _ = builder.try_init();
        }
    }
    Ok(())
}
