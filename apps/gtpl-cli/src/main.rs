use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use ais140_codec as gtpl;

#[derive(Parser, Debug)]
#[command(
    name = "gtpl",
    version,
    about = "GTPL/AIS140 tracker line tools",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode lines and print each record followed by its envelope
    Decode {
        /// A single raw line
        #[arg(long, conflicts_with = "file")]
        line: Option<String>,
        /// File with one raw line per row (stdin when neither is given)
        #[arg(long)]
        file: Option<String>,
    },
    /// Print only the gateway envelopes for a line
    Encode {
        #[arg(long)]
        line: String,
    },
    /// Send lines to a running bridge, as a tracker would
    Replay {
        /// Bridge address
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: String,
        /// File with one raw line per row
        #[arg(long, conflicts_with = "line")]
        file: Option<String>,
        /// A single raw line
        #[arg(long)]
        line: Option<String>,
        /// Pause between lines
        #[arg(long, default_value_t = 2000u64)]
        interval_ms: u64,
        /// Start over when the input is exhausted
        #[arg(long, action = ArgAction::SetTrue)]
        repeat: bool,
        /// Pause between connection attempts
        #[arg(long, default_value_t = 5u64)]
        retry_secs: u64,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { line, file } => {
            let lines = read_input(line, file.as_deref())?;
            decode_lines(&lines, &mut io::stdout().lock())
        }
        Commands::Encode { line } => encode_line(&line, &mut io::stdout().lock()),
        Commands::Replay {
            addr,
            file,
            line,
            interval_ms,
            repeat,
            retry_secs,
        } => {
            if line.is_none() && file.is_none() {
                anyhow::bail!("replay needs --line or --file");
            }
            let lines = read_input(line, file.as_deref())?;
            replay(
                &addr,
                &lines,
                Duration::from_millis(interval_ms),
                repeat,
                Duration::from_secs(retry_secs),
            )
        }
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

/// `--line`, else `--file`, else stdin. Blank rows are skipped.
fn read_input(line: Option<String>, file: Option<&str>) -> Result<Vec<String>> {
    if let Some(line) = line {
        return Ok(vec![line]);
    }
    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {path}"))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let mut lines = Vec::new();
    for row in reader.lines() {
        let row = row?;
        let row = row.trim_end_matches('\r');
        if !row.trim().is_empty() {
            lines.push(row.to_string());
        }
    }
    Ok(lines)
}

fn decode_lines(lines: &[String], out: &mut impl Write) -> Result<()> {
    for line in lines {
        let records = gtpl::decode(line);
        if records.is_empty() {
            warn!(line = %line, "no records decoded (run with RUST_LOG=debug for details)");
        }
        for record in &records {
            writeln!(out, "{}", serde_json::to_string_pretty(record)?)?;
            writeln!(out, "{}", gtpl::encode(record))?;
        }
    }
    Ok(())
}

fn encode_line(line: &str, out: &mut impl Write) -> Result<()> {
    for record in gtpl::records(line) {
        writeln!(out, "{}", gtpl::encode(&record))?;
    }
    Ok(())
}

fn connect_with_retry(addr: &str, retry: Duration) -> TcpStream {
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                info!(%addr, "connected to bridge");
                return stream;
            }
            Err(e) => {
                warn!(%addr, error = %e, "bridge unreachable, retrying in {retry:?}");
                thread::sleep(retry);
            }
        }
    }
}

/// Attempts per line, each on a fresh connection after the first.
const SEND_ATTEMPTS: u32 = 3;

fn replay(
    addr: &str,
    lines: &[String],
    interval: Duration,
    repeat: bool,
    retry: Duration,
) -> Result<()> {
    if lines.is_empty() {
        warn!("nothing to replay");
        return Ok(());
    }
    let sent = replay_on(
        || connect_with_retry(addr, retry),
        lines,
        interval,
        repeat,
        &mut io::stdout().lock(),
    )?;
    info!(sent, "replay finished");
    Ok(())
}

/// Write each line, newline terminated, echoing it to `echo`. A failed write reconnects and
/// resends the same line; a line still failing after [`SEND_ATTEMPTS`] is logged as lost.
fn replay_on<W, F>(
    mut connect: F,
    lines: &[String],
    interval: Duration,
    repeat: bool,
    echo: &mut impl Write,
) -> Result<u64>
where
    W: Write,
    F: FnMut() -> W,
{
    let mut stream = connect();
    let mut sent: u64 = 0;
    loop {
        for line in lines {
            let mut attempt = 1;
            loop {
                let written = stream
                    .write_all(line.as_bytes())
                    .and_then(|()| stream.write_all(b"\n"))
                    .and_then(|()| stream.flush());
                match written {
                    Ok(()) => {
                        sent += 1;
                        writeln!(echo, "{line}")?;
                        break;
                    }
                    Err(e) if attempt < SEND_ATTEMPTS => {
                        warn!(error = %e, attempt, "write failed, reconnecting to resend");
                        stream = connect();
                        attempt += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, line = %line, "line lost after {SEND_ATTEMPTS} attempts");
                        stream = connect();
                        break;
                    }
                }
            }
            thread::sleep(interval);
        }
        if !repeat {
            break;
        }
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    const STATUS: &str = "GTPL $1,867322035135813,A,290518,062804,18.709738,N,80.068397,E,0,406,309,11,0,14,1,0,26.4470#";

    #[test]
    fn test_decode_prints_record_then_envelope() {
        let mut out = Vec::new();
        decode_lines(&[STATUS.to_string()], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(r#""device_id": "867322035135813""#));
        assert!(text.trim_end().ends_with(
            r#"{"867322035135813":[{"ts":1527575284000,"values":{"lat":18.709738,"lng":80.068397,"speed":0,"box":false,"bat":true,"ign":false}}]}"#
        ));
    }

    #[test]
    fn test_encode_prints_one_envelope_per_record() {
        let line = format!(
            "{STATUS}GTPL $9,867322035135813,A,290518,062804,18.709738,S,80.068397,W,0#"
        );
        let mut out = Vec::new();
        encode_line(&line, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1],
            r#"{"867322035135813":[{"ts":1527575284000,"values":{"lat":-18.709738,"lng":-80.068397,"alert":"SOS"}}]}"#
        );
    }

    #[test]
    fn test_encode_ignores_foreign_line() {
        let mut out = Vec::new();
        encode_line("*ZJ,2030295119,V1,134310,A#", &mut out).unwrap();
        assert!(out.is_empty());
    }

    /// Shares its buffer across reconnects; fails the first `failures` writes.
    struct FlakyConn {
        received: std::rc::Rc<std::cell::RefCell<Vec<u8>>>,
        failures: std::rc::Rc<std::cell::Cell<u32>>,
    }

    impl Write for FlakyConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.received.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_replay_resends_line_after_failed_write() {
        let received = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let failures = std::rc::Rc::new(std::cell::Cell::new(1));
        let mut connects = 0;
        let lines = vec!["first".to_string(), "second".to_string()];
        let mut echo = Vec::new();

        let sent = replay_on(
            || {
                connects += 1;
                FlakyConn {
                    received: received.clone(),
                    failures: failures.clone(),
                }
            },
            &lines,
            Duration::ZERO,
            false,
            &mut echo,
        )
        .unwrap();

        assert_eq!(sent, 2);
        assert_eq!(connects, 2);
        assert_eq!(String::from_utf8(received.borrow().clone()).unwrap(), "first\nsecond\n");
        assert_eq!(String::from_utf8(echo).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_replay_gives_up_on_line_after_repeated_failures() {
        let received = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let failures = std::rc::Rc::new(std::cell::Cell::new(SEND_ATTEMPTS));
        let lines = vec!["lost".to_string(), "kept".to_string()];
        let mut echo = Vec::new();

        let sent = replay_on(
            || FlakyConn {
                received: received.clone(),
                failures: failures.clone(),
            },
            &lines,
            Duration::ZERO,
            false,
            &mut echo,
        )
        .unwrap();

        assert_eq!(sent, 1);
        assert_eq!(String::from_utf8(received.borrow().clone()).unwrap(), "kept\n");
    }

    #[test]
    fn test_replay_writes_newline_terminated_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let reader = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = String::new();
            conn.read_to_string(&mut received).unwrap();
            received
        });

        let lines = vec!["first".to_string(), STATUS.to_string()];
        replay(&addr, &lines, Duration::ZERO, false, Duration::from_millis(10)).unwrap();

        assert_eq!(reader.join().unwrap(), format!("first\n{STATUS}\n"));
    }
}
