//! # Fleet Partitioning
//!
//! Splits the ordered fleet into consecutive fixed-size batches. The result
//! depends only on the record order and the batch size, so every cycle of a
//! run (and every run with the same inputs) sees the same partition.

use crate::models::{WorkerId, WorkerRecord};
use serde::Serialize;

/// An ordered, non-empty slice of the fleet scheduled together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    /// Zero-based position within the cycle
    pub index: usize,
    pub workers: Vec<WorkerRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.identity.clone()).collect()
    }
}

/// `ceil(worker_count / batch_size)`, zero for an empty fleet or batch size
pub fn total_batches(worker_count: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    worker_count.div_ceil(batch_size)
}

/// Partition `records` into batches of at most `batch_size`, in order.
///
/// Only the last batch may be smaller. A zero batch size yields no batches;
/// configuration validation rejects it before scheduling starts.
pub fn partition(records: &[WorkerRecord], batch_size: usize) -> Vec<Batch> {
    if batch_size == 0 {
        return Vec::new();
    }
    records
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            workers: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EgressEndpoint;

    fn fleet(n: usize) -> Vec<WorkerRecord> {
        (0..n)
            .map(|i| {
                WorkerRecord::new(
                    i as u64,
                    EgressEndpoint::parse("http://u:p@127.0.0.1:3128").unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_seven_workers_in_threes() {
        let batches = partition(&fleet(7), 3);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(total_batches(7, 3), 3);
        assert_eq!(batches[2].index, 2);
        assert_eq!(batches[2].worker_ids(), vec![WorkerId::from(6u64)]);
    }

    #[test]
    fn test_batch_larger_than_fleet_is_single_batch() {
        let batches = partition(&fleet(4), 10);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 4);
        assert_eq!(total_batches(4, 10), 1);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(partition(&fleet(0), 3).is_empty());
        assert!(partition(&fleet(3), 0).is_empty());
        assert_eq!(total_batches(0, 3), 0);
        assert_eq!(total_batches(3, 0), 0);
    }
}
