use serde::Serialize;

/// A single observed token transfer, as read from the input stream.
/// `value` is the raw smallest-unit amount; normalization happens in the graph builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferEvent {
    pub src: String,
    pub dst: String,
    pub value: u128,
}

impl TransferEvent {
    pub fn new(src: impl Into<String>, dst: impl Into<String>, value: u128) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            value,
        }
    }
}

/// Events collected within one window, in arrival order.
pub type Batch = Vec<TransferEvent>;
