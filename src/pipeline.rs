use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;

use crate::anomaly::types::AnomalyReport;
use crate::config::Config;
use crate::graph::builder::{build_graph, NodeIndex, TransactionGraph};
use crate::indexer::decoder::decode_transfer_line;
use crate::indexer::window::BatchAccumulator;
use crate::model::error::ModelError;
use crate::model::manager::{ModelFactory, ModelManager};
use crate::model::{scorer, trainer};

/// Fatal conditions of the detection loop.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("event source exhausted ({pending} buffered events discarded)")]
    SourceExhausted { pending: usize },
}

/// Counters accumulated over the life of a session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub events_accepted: u64,
    pub records_rejected: u64,
    pub batches_processed: u64,
    pub batches_empty: u64,
    pub batches_skipped: u64,
}

/// Long-lived state threaded through every window:
/// 1. Accumulate decoded events
/// 2. On flush, build the transaction graph
/// 3. Get or rebuild the model, train it
/// 4. Score edges into an anomaly report
pub struct DetectionSession {
    accumulator: BatchAccumulator,
    models: ModelManager,
    rng: StdRng,
    decimal_places: u32,
    training_epochs: usize,
    anomaly_threshold: f64,
    window: u64,
    stats: SessionStats,
}

impl DetectionSession {
    pub fn new(config: &Config, now: Instant) -> Self {
        // Negative sampling gets its own stream so it does not perturb initialization.
        let rng = match config.model.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };

        Self {
            accumulator: BatchAccumulator::new(config.batching.window_length(), now),
            models: ModelManager::new(ModelFactory::new(&config.model)),
            rng,
            decimal_places: config.batching.decimal_places,
            training_epochs: config.model.training_epochs,
            anomaly_threshold: config.scoring.anomaly_threshold,
            window: 0,
            stats: SessionStats::default(),
        }
    }

    /// Decode one raw input line into the current window. Malformed lines are logged and
    /// dropped without touching the window. Returns whether an event was accepted.
    pub fn ingest_line(&mut self, line: &[u8]) -> bool {
        match decode_transfer_line(line) {
            Ok(Some(event)) => {
                self.accumulator.push(event);
                self.stats.events_accepted += 1;
                true
            }
            Ok(None) => false,
            Err(e) => {
                self.stats.records_rejected += 1;
                let preview = String::from_utf8_lossy(&line[..line.len().min(200)]);
                tracing::warn!(error = %e, line = %preview, "Skipping malformed transfer record");
                false
            }
        }
    }

    pub fn deadline(&self) -> Instant {
        self.accumulator.deadline()
    }

    pub fn window_length(&self) -> Duration {
        self.accumulator.window_length()
    }

    pub fn flush_due(&self, now: Instant) -> bool {
        self.accumulator.should_flush(now)
    }

    /// Events buffered in the open window.
    pub fn pending(&self) -> usize {
        self.accumulator.len()
    }

    /// Close the current window and process its events. `None` when the window was empty
    /// or the batch failed numerically.
    ///
    /// The window stays closed afterwards; call [`restart_window`](Self::restart_window)
    /// once processing is over so that events queued meanwhile land in the next one.
    pub fn flush(&mut self) -> Option<AnomalyReport> {
        let batch = self.accumulator.take();
        let Some((graph, index)) = build_graph(&batch, self.decimal_places) else {
            self.stats.batches_empty += 1;
            tracing::debug!("Window closed with no events");
            return None;
        };

        self.window += 1;
        tracing::info!(
            window = self.window,
            events = batch.len(),
            nodes = graph.num_nodes(),
            edges = graph.num_edges(),
            "Processing batch"
        );

        match self.process_graph(&graph, &index) {
            Ok(report) => {
                self.stats.batches_processed += 1;
                tracing::info!(
                    window = self.window,
                    nodes = report.node_count,
                    edges = report.edge_count,
                    flagged = report.flagged.len(),
                    accepted = self.stats.events_accepted,
                    rejected = self.stats.records_rejected,
                    "Batch scored"
                );
                for anomaly in &report.flagged {
                    tracing::warn!(
                        src = %anomaly.src_address,
                        dst = %anomaly.dst_address,
                        error = anomaly.absolute_error,
                        "ANOMALY DETECTED"
                    );
                }
                Some(report)
            }
            Err(e) => {
                self.stats.batches_skipped += 1;
                tracing::error!(window = self.window, error = %e, "Batch failed, skipping report");
                // Parameters may be half-updated; replace wholesale on the next batch.
                self.models.discard();
                None
            }
        }
    }

    /// Open the next window at `now`.
    pub fn restart_window(&mut self, now: Instant) {
        self.accumulator.restart(now);
    }

    /// Train on and score one window's graph.
    fn process_graph(
        &mut self,
        graph: &TransactionGraph,
        index: &NodeIndex,
    ) -> Result<AnomalyReport, ModelError> {
        let model = self.models.get_or_update_model(graph.num_nodes());
        let summary = trainer::train(model, graph, self.training_epochs, &mut self.rng)?;
        tracing::debug!(
            epochs = summary.epochs,
            initial_loss = summary.initial_loss,
            final_loss = summary.final_loss,
            "Training complete"
        );

        scorer::score(model, graph, index, self.anomaly_threshold, self.window)
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    /// Index of the last window that contained events.
    pub fn window(&self) -> u64 {
        self.window
    }
}
