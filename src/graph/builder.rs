use std::collections::HashMap;

use bigdecimal::BigDecimal;

use crate::indexer::types::TransferEvent;
use crate::tokens::amount::{normalize_amount, to_f64};

/// Bijective mapping between addresses and dense node ids `[0, len)`.
/// Ids are assigned in first-appearance order, so they are only meaningful within one batch.
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    address_to_id: HashMap<String, usize>,
    id_to_address: Vec<String>,
}

impl NodeIndex {
    fn get_or_insert(&mut self, address: &str) -> usize {
        if let Some(&id) = self.address_to_id.get(address) {
            return id;
        }
        let id = self.id_to_address.len();
        self.address_to_id.insert(address.to_string(), id);
        self.id_to_address.push(address.to_string());
        id
    }

    pub fn id_of(&self, address: &str) -> Option<usize> {
        self.address_to_id.get(address).copied()
    }

    pub fn address_of(&self, id: usize) -> Option<&str> {
        self.id_to_address.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_address.is_empty()
    }
}

/// Aggregated directed edge: the sum of every normalized transfer from `src` to `dst`.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub src: usize,
    pub dst: usize,
    pub weight: BigDecimal,
    pub transfer_count: u64,
}

impl Edge {
    pub fn weight_f64(&self) -> f64 {
        to_f64(&self.weight)
    }
}

#[derive(Debug, Clone)]
pub struct TransactionGraph {
    num_nodes: usize,
    edges: Vec<Edge>,
}

impl TransactionGraph {
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Build the transaction graph for one batch.
///
/// Returns `None` for an empty batch. Transfers sharing a `(src, dst)` pair are merged
/// into a single edge whose weight is the exact sum of their normalized amounts.
pub fn build_graph(batch: &[TransferEvent], decimals: u32) -> Option<(TransactionGraph, NodeIndex)> {
    if batch.is_empty() {
        return None;
    }

    let mut index = NodeIndex::default();
    let mut edges: Vec<Edge> = Vec::new();
    let mut edge_slots: HashMap<(usize, usize), usize> = HashMap::new();

    for event in batch {
        let src = index.get_or_insert(&event.src);
        let dst = index.get_or_insert(&event.dst);
        let amount = normalize_amount(event.value, decimals);

        match edge_slots.get(&(src, dst)) {
            Some(&slot) => {
                let edge = &mut edges[slot];
                edge.weight += amount;
                edge.transfer_count += 1;
            }
            None => {
                edge_slots.insert((src, dst), edges.len());
                edges.push(Edge {
                    src,
                    dst,
                    weight: amount,
                    transfer_count: 1,
                });
            }
        }
    }

    let graph = TransactionGraph {
        num_nodes: index.len(),
        edges,
    };
    Some((graph, index))
}
