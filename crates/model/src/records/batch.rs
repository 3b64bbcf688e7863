use crate::core::identifiers::SourceScanId;

/// A contiguous slice of the input scan-id list, processed as one
/// retryable unit. Batch numbers are 1-based and stable across resumes
/// because they derive only from input order and batch size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub batch_number: u32,
    pub scan_ids: Vec<SourceScanId>,
    pub total_batches: u32,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.scan_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scan_ids.is_empty()
    }
}

/// Partitions `scan_ids` into batches of at most `batch_size` ids, in
/// input order. The final batch may be smaller; concatenating the
/// batches reproduces the input exactly.
///
/// `batch_size` must be positive; config validation rejects zero before
/// a plan is ever built.
pub fn plan_batches(scan_ids: &[SourceScanId], batch_size: usize) -> Vec<Batch> {
    debug_assert!(batch_size > 0, "batch_size validated upstream");
    if scan_ids.is_empty() {
        return Vec::new();
    }

    let total_batches = scan_ids.len().div_ceil(batch_size) as u32;
    scan_ids
        .chunks(batch_size)
        .enumerate()
        .map(|(idx, chunk)| Batch {
            batch_number: idx as u32 + 1,
            scan_ids: chunk.to_vec(),
            total_batches,
        })
        .collect()
}
