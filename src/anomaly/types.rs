use chrono::{DateTime, Utc};
use serde::Serialize;

/// Reconstruction result for one aggregated edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeScore {
    pub src_address: String,
    pub dst_address: String,
    pub original_weight: f64,
    pub reconstructed_score: f64,
    pub absolute_error: f64,
}

impl EdgeScore {
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.absolute_error > threshold
    }
}

/// Per-window output: every edge, plus the subset whose error exceeds the threshold.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    pub window: u64,
    pub generated_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub threshold: f64,
    pub entries: Vec<EdgeScore>,
    pub flagged: Vec<EdgeScore>,
}

impl AnomalyReport {
    pub fn new(window: u64, node_count: usize, threshold: f64, entries: Vec<EdgeScore>) -> Self {
        let flagged = entries
            .iter()
            .filter(|e| e.exceeds(threshold))
            .cloned()
            .collect();
        Self {
            window,
            generated_at: Utc::now(),
            node_count,
            edge_count: entries.len(),
            threshold,
            entries,
            flagged,
        }
    }
}
