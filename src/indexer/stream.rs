use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::anomaly::report::ReportSink;
use crate::pipeline::{DetectionSession, DetectorError};

use super::source::RawLine;

/// Main detection loop: consume raw lines, and whenever the window closes, process the
/// batch synchronously and emit its report.
///
/// Windows close on time even when the stream is idle. The next window opens only once
/// the closed one has been processed and reported, so lines that queue up meanwhile all
/// fall into it. Returns `Ok(())` on shutdown and [`DetectorError::SourceExhausted`] when
/// the reader hangs up; the open window is discarded in both cases.
pub async fn run_detector<S: ReportSink>(
    session: &mut DetectionSession,
    lines: &mut mpsc::Receiver<RawLine>,
    sink: &mut S,
    shutdown: &CancellationToken,
) -> eyre::Result<()> {
    tracing::info!(
        window_secs = session.window_length().as_secs(),
        "Detection loop started"
    );

    loop {
        let deadline = session.deadline();

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::info!(
                    discarded = session.pending(),
                    "Shutdown received, stopping detection loop"
                );
                return Ok(());
            }
            maybe_line = lines.recv() => {
                match maybe_line {
                    Some(line) => {
                        session.ingest_line(&line);
                    }
                    None => {
                        let pending = session.pending();
                        tracing::warn!(discarded = pending, "Event source closed");
                        return Err(DetectorError::SourceExhausted { pending }.into());
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {}
        }

        if session.flush_due(Instant::now()) {
            if let Some(report) = session.flush() {
                sink.emit(&report)?;
            }
            session.restart_window(Instant::now());
        }
    }
}
