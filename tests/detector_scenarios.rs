use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use chainwatch_gae::anomaly::report::ReportSink;
use chainwatch_gae::anomaly::types::AnomalyReport;
use chainwatch_gae::config::Config;
use chainwatch_gae::indexer::source::RawLine;
use chainwatch_gae::indexer::stream::run_detector;
use chainwatch_gae::model::manager::ModelState;
use chainwatch_gae::pipeline::{DetectionSession, DetectorError};

fn test_config() -> Config {
    let mut config = Config::default();
    config.model.embedding_dim = 8;
    config.model.hidden_dim = 16;
    config.model.latent_dim = 8;
    config.model.training_epochs = 20;
    config.model.seed = Some(1234);
    config
}

fn transfer(src: &str, dst: &str, value: u64) -> RawLine {
    format!(r#"{{"src":"{}","dst":"{}","value":{}}}"#, src, dst, value).into_bytes()
}

/// Cancel `shutdown` once `after` has elapsed.
fn cancel_after(shutdown: &CancellationToken, after: Duration) {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        shutdown.cancel();
    });
}

#[tokio::test(start_paused = true)]
async fn test_single_transfer_window() {
    let config = test_config();
    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let mut session = DetectionSession::new(&config, Instant::now());
    let mut reports: Vec<AnomalyReport> = Vec::new();

    tx.send(transfer("0xA", "0xB", 1_000_000)).await.unwrap();
    cancel_after(&shutdown, Duration::from_secs(61));

    run_detector(&mut session, &mut rx, &mut reports, &shutdown)
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.node_count, 2);
    assert_eq!(report.edge_count, 1);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].src_address, "0xA");
    assert_eq!(report.entries[0].dst_address, "0xB");
    assert_eq!(report.entries[0].original_weight, 1.0);
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn test_same_pair_is_aggregated() {
    let config = test_config();
    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let mut session = DetectionSession::new(&config, Instant::now());
    let mut reports: Vec<AnomalyReport> = Vec::new();

    tx.send(transfer("0xA", "0xB", 1_000_000)).await.unwrap();
    tx.send(transfer("0xA", "0xB", 2_000_000)).await.unwrap();
    cancel_after(&shutdown, Duration::from_secs(61));

    run_detector(&mut session, &mut rx, &mut reports, &shutdown)
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].edge_count, 1);
    assert_eq!(reports[0].entries[0].original_weight, 3.0);
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn test_node_count_change_reinitializes_model() {
    let config = test_config();
    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let mut session = DetectionSession::new(&config, Instant::now());
    let mut reports: Vec<AnomalyReport> = Vec::new();

    // Window 1: three nodes
    tx.send(transfer("0xA", "0xB", 1_000_000)).await.unwrap();
    tx.send(transfer("0xB", "0xC", 1_000_000)).await.unwrap();

    // Window 2: five nodes, arriving after the first window closed
    let feeder = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(70)).await;
        for (src, dst) in [("0xA", "0xB"), ("0xB", "0xC"), ("0xC", "0xD"), ("0xD", "0xE")] {
            feeder.send(transfer(src, dst, 5_000_000)).await.unwrap();
        }
    });
    cancel_after(&shutdown, Duration::from_secs(130));

    run_detector(&mut session, &mut rx, &mut reports, &shutdown)
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].node_count, 3);
    assert_eq!(reports[1].node_count, 5);
    assert_eq!(session.models().reinit_count(), 1);
    assert_eq!(
        session.models().state(),
        ModelState::Ready { num_nodes: 5, generation: 2 }
    );
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn test_equal_node_count_keeps_model() {
    let config = test_config();
    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let mut session = DetectionSession::new(&config, Instant::now());
    let mut reports: Vec<AnomalyReport> = Vec::new();

    tx.send(transfer("0xA", "0xB", 1_000_000)).await.unwrap();
    let feeder = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(70)).await;
        feeder.send(transfer("0xC", "0xD", 9_000_000)).await.unwrap();
    });
    cancel_after(&shutdown, Duration::from_secs(130));

    run_detector(&mut session, &mut rx, &mut reports, &shutdown)
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(session.models().reinit_count(), 0);
    assert_eq!(
        session.models().state(),
        ModelState::Ready { num_nodes: 2, generation: 1 }
    );
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_lines_are_skipped() {
    let config = test_config();
    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let mut session = DetectionSession::new(&config, Instant::now());
    let mut reports: Vec<AnomalyReport> = Vec::new();

    tx.send(transfer("0xA", "0xB", 1_000_000)).await.unwrap();
    tx.send(vec![0xc3, 0x28, 0xff, b'{']).await.unwrap();
    tx.send(b"{\"src\":\"0xB\"".to_vec()).await.unwrap();
    tx.send(transfer("0xB", "0xC", 2_000_000)).await.unwrap();
    cancel_after(&shutdown, Duration::from_secs(61));

    run_detector(&mut session, &mut rx, &mut reports, &shutdown)
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].node_count, 3);
    assert_eq!(reports[0].edge_count, 2);
    assert_eq!(session.stats().events_accepted, 2);
    assert_eq!(session.stats().records_rejected, 2);
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn test_idle_windows_emit_nothing() {
    let config = test_config();
    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let mut session = DetectionSession::new(&config, Instant::now());
    let mut reports: Vec<AnomalyReport> = Vec::new();

    cancel_after(&shutdown, Duration::from_secs(200));

    run_detector(&mut session, &mut rx, &mut reports, &shutdown)
        .await
        .unwrap();

    assert!(reports.is_empty());
    assert_eq!(session.stats().batches_empty, 3);
    assert_eq!(session.models().state(), ModelState::Uninitialized);
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn test_source_exhaustion_discards_partial_batch() {
    let config = test_config();
    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let mut session = DetectionSession::new(&config, Instant::now());
    let mut reports: Vec<AnomalyReport> = Vec::new();

    tx.send(transfer("0xA", "0xB", 1_000_000)).await.unwrap();
    drop(tx);

    let err = run_detector(&mut session, &mut rx, &mut reports, &shutdown)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DetectorError>(),
        Some(DetectorError::SourceExhausted { pending: 1 })
    ));
    assert!(reports.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_partial_batch() {
    let config = test_config();
    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let mut session = DetectionSession::new(&config, Instant::now());
    let mut reports: Vec<AnomalyReport> = Vec::new();

    tx.send(transfer("0xA", "0xB", 1_000_000)).await.unwrap();
    cancel_after(&shutdown, Duration::from_secs(30));

    run_detector(&mut session, &mut rx, &mut reports, &shutdown)
        .await
        .unwrap();

    assert!(reports.is_empty());
    assert_eq!(session.pending(), 1);
    assert_eq!(session.stats().batches_processed, 0);
    drop(tx);
}

/// Collects reports, stalling the loop on the first one the way a slow batch would, and
/// stops the session once two have arrived.
struct StallingSink {
    reports: Vec<AnomalyReport>,
    stall: Duration,
    shutdown: CancellationToken,
}

impl ReportSink for StallingSink {
    fn emit(&mut self, report: &AnomalyReport) -> eyre::Result<()> {
        if self.reports.is_empty() {
            std::thread::sleep(self.stall);
        }
        self.reports.push(report.clone());
        if self.reports.len() == 2 {
            self.shutdown.cancel();
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lines_queued_during_slow_batch_share_next_window() {
    let mut config = test_config();
    config.batching.window_secs = 1;
    let (tx, mut rx) = mpsc::channel(64);
    let shutdown = CancellationToken::new();
    let mut session = DetectionSession::new(&config, Instant::now());
    let mut sink = StallingSink {
        reports: Vec::new(),
        stall: Duration::from_millis(1500),
        shutdown: shutdown.clone(),
    };

    tx.send(transfer("0xA", "0xB", 1_000_000)).await.unwrap();

    // Arrives after window 1 closed (t=1s) but before its handling ends (t=2.5s)
    let feeder = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1700)).await;
        for i in 0..10 {
            let line = transfer(&format!("0xS{}", i), &format!("0xD{}", i), 1_000_000);
            feeder.send(line).await.unwrap();
        }
    });
    cancel_after(&shutdown, Duration::from_secs(10));

    run_detector(&mut session, &mut rx, &mut sink, &shutdown)
        .await
        .unwrap();

    assert_eq!(sink.reports.len(), 2);
    assert_eq!(sink.reports[0].edge_count, 1);
    assert_eq!(sink.reports[1].window, 2);
    assert_eq!(sink.reports[1].edge_count, 10);
    assert_eq!(sink.reports[1].node_count, 20);
    drop(tx);
}
