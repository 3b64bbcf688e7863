use model::core::identifiers::{SourceScanId, TargetScanId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One accumulated correspondence between a source scan and the scan
/// created for it in the target instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMapping {
    pub source_scan_id: SourceScanId,
    pub target_scan_id: TargetScanId,
}

/// Durable run progress. All three fields are required on load; a
/// document missing any of them is corrupt, never partially accepted.
///
/// Invariants: `completed_batches` only grows, and `scan_mapping` holds
/// exactly the successfully created pairs of completed batches, in
/// completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub completed_batches: BTreeSet<u32>,
    pub scan_mapping: Vec<ScanMapping>,
    pub failed_scans: u64,
}

impl Checkpoint {
    pub fn empty() -> Self {
        Self {
            completed_batches: BTreeSet::new(),
            scan_mapping: Vec::new(),
            failed_scans: 0,
        }
    }

    pub fn is_batch_completed(&self, batch_number: u32) -> bool {
        self.completed_batches.contains(&batch_number)
    }

    /// Folds one terminal batch into the checkpoint. Called exactly once
    /// per batch, immediately before persisting.
    pub fn record_batch(
        &mut self,
        batch_number: u32,
        mappings: impl IntoIterator<Item = ScanMapping>,
        failed: u64,
    ) {
        self.completed_batches.insert(batch_number);
        self.scan_mapping.extend(mappings);
        self.failed_scans += failed;
    }

    /// Lowest batch number a resumed run still has to process, or `None`
    /// when all `total_batches` are done.
    pub fn first_pending_batch(&self, total_batches: u32) -> Option<u32> {
        (1..=total_batches).find(|n| !self.completed_batches.contains(n))
    }

    pub fn mapped_count(&self) -> usize {
        self.scan_mapping.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(source: i64, target: i64) -> ScanMapping {
        ScanMapping {
            source_scan_id: SourceScanId::new(source),
            target_scan_id: TargetScanId::new(target),
        }
    }

    #[test]
    fn record_batch_accumulates_in_completion_order() {
        let mut cp = Checkpoint::empty();
        cp.record_batch(1, [mapping(1, 101), mapping(2, 102)], 0);
        cp.record_batch(2, [mapping(11, 111)], 3);

        assert_eq!(cp.completed_batches, BTreeSet::from([1, 2]));
        assert_eq!(
            cp.scan_mapping,
            vec![mapping(1, 101), mapping(2, 102), mapping(11, 111)]
        );
        assert_eq!(cp.failed_scans, 3);
    }

    #[test]
    fn first_pending_batch_skips_completed_prefix_and_gaps() {
        let mut cp = Checkpoint::empty();
        assert_eq!(cp.first_pending_batch(5), Some(1));

        cp.record_batch(1, [], 0);
        cp.record_batch(2, [], 0);
        assert_eq!(cp.first_pending_batch(5), Some(3));

        cp.record_batch(4, [], 0);
        assert_eq!(cp.first_pending_batch(5), Some(3));

        cp.record_batch(3, [], 0);
        cp.record_batch(5, [], 0);
        assert_eq!(cp.first_pending_batch(5), None);
    }

    #[test]
    fn serialized_form_matches_the_documented_field_names() {
        let mut cp = Checkpoint::empty();
        cp.record_batch(1, [mapping(7, 70)], 1);

        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(json["completed_batches"], serde_json::json!([1]));
        assert_eq!(json["scan_mapping"][0]["source_scan_id"], 7);
        assert_eq!(json["scan_mapping"][0]["target_scan_id"], 70);
        assert_eq!(json["failed_scans"], 1);
    }
}
