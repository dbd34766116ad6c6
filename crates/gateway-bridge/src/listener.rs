use crate::{BridgeMetrics, LinePipeline, ListenConfig, Result, MAX_IN_FLIGHT_LIMIT};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Result of reading one newline-framed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framed {
    Line,
    TooLong,
    Eof,
}

/// Read up to and including the next `\n`, keeping at most `max` bytes in `buf`.
///
/// An over-long line is consumed to its newline and reported as [`Framed::TooLong`] with `buf`
/// empty. A final unterminated segment at EOF is still a line.
async fn read_line_bounded<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<Framed>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut overflow = false;
    loop {
        let (consumed, terminated) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(match (overflow, buf.is_empty()) {
                    (true, _) => Framed::TooLong,
                    (false, true) => Framed::Eof,
                    (false, false) => Framed::Line,
                });
            }
            let newline = available.iter().position(|b| *b == b'\n');
            let chunk = match newline {
                Some(i) => &available[..i],
                None => available,
            };
            if !overflow {
                if buf.len() + chunk.len() > max {
                    overflow = true;
                    buf.clear();
                } else {
                    buf.extend_from_slice(chunk);
                }
            }
            match newline {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        if terminated {
            return Ok(if overflow {
                Framed::TooLong
            } else {
                Framed::Line
            });
        }
    }
}

/// Per-connection counters, returned when the connection closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub lines: u64,
    pub oversized: u64,
}

/// Frames lines off a byte stream and runs each through the pipeline on its own task.
#[derive(Clone)]
pub struct LineHandler {
    pipeline: LinePipeline,
    metrics: BridgeMetrics,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    max_line_bytes: usize,
}

impl LineHandler {
    /// `max_in_flight` is clamped to `1..=MAX_IN_FLIGHT_LIMIT`.
    pub fn new(pipeline: LinePipeline, metrics: BridgeMetrics, config: &ListenConfig) -> Self {
        let max_in_flight = config.max_in_flight.clamp(1, MAX_IN_FLIGHT_LIMIT);
        Self {
            pipeline,
            metrics,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            max_line_bytes: config.max_line_bytes,
        }
    }

    /// Serve one stream until EOF. Waits for a task permit before spawning each line, so a
    /// saturated bridge stops reading.
    pub async fn serve<R>(&self, mut reader: R, conn_id: u64) -> io::Result<ConnectionStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stats = ConnectionStats::default();
        let mut buf = Vec::with_capacity(256);
        loop {
            match read_line_bounded(&mut reader, &mut buf, self.max_line_bytes).await? {
                Framed::Eof => return Ok(stats),
                Framed::TooLong => {
                    stats.oversized += 1;
                    self.metrics.lines_received.inc();
                    self.metrics.lines_dropped.inc();
                    warn!(
                        conn = conn_id,
                        limit = self.max_line_bytes,
                        "discarding over-long line"
                    );
                }
                Framed::Line => {
                    stats.lines += 1;
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    let Ok(permit) = self.permits.clone().acquire_owned().await else {
                        return Ok(stats);
                    };
                    let pipeline = self.pipeline.clone();
                    tokio::spawn(async move {
                        pipeline.process_line(&line).await;
                        drop(permit);
                    });
                }
            }
        }
    }

    /// Wait until no line task is running.
    pub async fn idle(&self) {
        let all = u32::try_from(self.max_in_flight).unwrap_or(u32::MAX);
        if let Ok(permits) = self.permits.acquire_many(all).await {
            drop(permits);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.max_in_flight
            .saturating_sub(self.permits.available_permits())
    }
}

/// TCP front end: one reader task per accepted connection.
pub struct LineListener {
    listener: TcpListener,
    handler: LineHandler,
    metrics: BridgeMetrics,
}

impl LineListener {
    pub async fn bind(
        config: &ListenConfig,
        pipeline: LinePipeline,
        metrics: BridgeMetrics,
    ) -> Result<Self> {
        let listener = TcpListener::bind(config.addr()).await?;
        let handler = LineHandler::new(pipeline, metrics.clone(), config);
        Ok(Self {
            listener,
            handler,
            metrics,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped.
    pub async fn run(&self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "listening for tracker connections");
        }
        let mut next_id: u64 = 0;
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };
            next_id += 1;
            let conn_id = next_id;
            let handler = self.handler.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                metrics.connections_open.inc();
                info!(conn = conn_id, %peer, "connection opened");
                match handler.serve(BufReader::new(stream), conn_id).await {
                    Ok(stats) => info!(
                        conn = conn_id,
                        %peer,
                        lines = stats.lines,
                        oversized = stats.oversized,
                        in_flight = handler.in_flight(),
                        "connection closed"
                    ),
                    Err(e) => debug!(conn = conn_id, %peer, error = %e, "connection error"),
                }
                metrics.connections_open.dec();
            });
        }
    }
}
