use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SourceConfig;

/// One raw line from the input stream, without its trailing newline.
/// Decoding happens on the processing side so malformed lines can be counted there.
pub type RawLine = Vec<u8>;

/// Open the configured input (a file, or stdin) and spawn a reader task feeding `tx`.
pub async fn spawn_configured_reader(
    config: &SourceConfig,
    tx: mpsc::Sender<RawLine>,
    shutdown: CancellationToken,
) -> eyre::Result<JoinHandle<()>> {
    let backoff = Backoff::new(config.retry_initial_delay(), config.retry_max_delay());

    let handle = match &config.input_path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| eyre::eyre!("Failed to open input file '{}': {}", path, e))?;
            tracing::info!(path = %path, "Reading transfer events from file");
            tokio::spawn(read_lines(BufReader::new(file), tx, backoff, shutdown))
        }
        None => {
            tracing::info!("Reading transfer events from stdin");
            tokio::spawn(read_lines(
                BufReader::new(tokio::io::stdin()),
                tx,
                backoff,
                shutdown,
            ))
        }
    };

    Ok(handle)
}

/// Capped exponential backoff for transient read failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt; doubles up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Read lines until EOF or shutdown, forwarding each one to the processing loop.
///
/// Read errors are treated as transient: they are logged and retried after a backoff
/// delay, indefinitely. Dropping `tx` on return signals exhaustion to the receiver.
pub async fn read_lines<R>(
    mut reader: R,
    tx: mpsc::Sender<RawLine>,
    mut backoff: Backoff,
    shutdown: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut failures = 0u32;

    loop {
        let mut buf = Vec::new();
        let read = tokio::select! {
            res = reader.read_until(b'\n', &mut buf) => res,
            _ = shutdown.cancelled() => {
                tracing::debug!("Shutdown received, stopping reader");
                return;
            }
        };

        match read {
            Ok(0) => {
                tracing::info!("Input stream reached end of file");
                return;
            }
            Ok(_) => {
                if failures > 0 {
                    tracing::info!(failures, "Input stream recovered");
                    failures = 0;
                    backoff.reset();
                }
                strip_line_ending(&mut buf);
                // Blocks when the queue is full; lines wait rather than being dropped.
                if tx.send(buf).await.is_err() {
                    tracing::debug!("Processing loop gone, stopping reader");
                    return;
                }
            }
            Err(e) => {
                failures += 1;
                let delay = backoff.next_delay();
                tracing::warn!(
                    attempt = failures,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Input read failed, retrying..."
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => return,
                }
            }
        }
    }
}

fn strip_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}
