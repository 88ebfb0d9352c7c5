//! Resumption planning.
//!
//! Decides, for every discovered file, which byte ranges still have to be
//! sent and under which sequence id, given the records of a previous
//! interrupted transfer. The planner owns the fresh sequence-id counter, so
//! the queue keeps it behind the same lock as the heap it feeds.

use crate::source::metadata::{ByteRange, PriorTransferRecord, ResumptionStatus};
use std::collections::HashMap;
use tracing::{debug, info};

/// Result of planning a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub status: ResumptionStatus,
    /// Ranges still to transfer; empty when `status` is `Complete`
    pub remaining: Vec<ByteRange>,
    pub seq_id: u64,
    pub prev_seq_id: Option<u64>,
}

impl Plan {
    /// Total bytes left to send for this file
    pub fn remaining_bytes(&self) -> u64 {
        self.remaining.iter().map(ByteRange::len).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.status == ResumptionStatus::Complete
    }
}

/// Prior-transfer lookup plus the fresh sequence-id counter
#[derive(Debug, Default)]
pub struct ResumptionPlanner {
    prior: HashMap<String, PriorTransferRecord>,
    next_seq_id: u64,
}

impl ResumptionPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Planner seeded with prior records. Fresh ids start above every prior id.
    pub fn with_prior_records(records: Vec<PriorTransferRecord>) -> Self {
        let mut planner = Self::new();
        for record in records {
            planner.next_seq_id = planner.next_seq_id.max(record.seq_id + 1);
            planner.prior.insert(record.rel_path.clone(), record);
        }
        debug!(
            records = planner.prior.len(),
            next_seq_id = planner.next_seq_id,
            "Loaded prior transfer records"
        );
        planner
    }

    /// Next id a new or size-changed file would receive
    pub fn next_seq_id(&self) -> u64 {
        self.next_seq_id
    }

    /// Plan one file. Consumes a fresh sequence id unless the file resumes
    /// under (or was completed by) its prior record.
    pub fn plan(&mut self, rel_path: &str, file_size: u64) -> Plan {
        let Some(record) = self.prior.get(rel_path) else {
            return Plan {
                status: ResumptionStatus::New,
                remaining: vec![ByteRange::whole(file_size)],
                seq_id: self.take_seq_id(),
                prev_seq_id: None,
            };
        };

        if record.file_size != file_size {
            info!(
                "File size changed since previous transfer {} {} {}",
                rel_path, file_size, record.file_size
            );
            let status = if record.file_size > file_size {
                ResumptionStatus::SizeMismatchLarger
            } else {
                ResumptionStatus::SizeMismatchSmaller
            };
            let prev_seq_id = record.seq_id;
            return Plan {
                status,
                remaining: vec![ByteRange::whole(file_size)],
                seq_id: self.take_seq_id(),
                prev_seq_id: Some(prev_seq_id),
            };
        }

        if record.remaining.is_empty() {
            info!("{} completely sent in previous transfer", rel_path);
            return Plan {
                status: ResumptionStatus::Complete,
                remaining: Vec::new(),
                seq_id: record.seq_id,
                prev_seq_id: None,
            };
        }

        Plan {
            status: ResumptionStatus::Partial,
            remaining: record.remaining.clone(),
            seq_id: record.seq_id,
            prev_seq_id: None,
        }
    }

    fn take_seq_id(&mut self) -> u64 {
        let id = self.next_seq_id;
        self.next_seq_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        path: &str,
        seq_id: u64,
        size: u64,
        remaining: Vec<ByteRange>,
    ) -> PriorTransferRecord {
        PriorTransferRecord {
            rel_path: path.to_string(),
            seq_id,
            file_size: size,
            remaining,
        }
    }

    #[test]
    fn test_new_files_get_sequential_ids() {
        let mut planner = ResumptionPlanner::new();

        let a = planner.plan("a.txt", 500);
        let b = planner.plan("b.txt", 1500);

        assert_eq!(a.status, ResumptionStatus::New);
        assert_eq!(a.remaining, vec![ByteRange::whole(500)]);
        assert_eq!(a.seq_id, 0);
        assert_eq!(b.seq_id, 1);
        assert_eq!(b.prev_seq_id, None);
        assert_eq!(planner.next_seq_id(), 2);
    }

    #[test]
    fn test_partial_resumes_under_prior_id() {
        let prior = vec![record("a.txt", 4, 500, vec![ByteRange::new(100, 400)])];
        let mut planner = ResumptionPlanner::with_prior_records(prior);

        let plan = planner.plan("a.txt", 500);

        assert_eq!(plan.status, ResumptionStatus::Partial);
        assert_eq!(plan.remaining, vec![ByteRange::new(100, 400)]);
        assert_eq!(plan.seq_id, 4);
        assert_eq!(plan.prev_seq_id, None);
        assert_eq!(plan.remaining_bytes(), 400);
        // resuming does not consume a fresh id
        assert_eq!(planner.next_seq_id(), 5);
    }

    #[test]
    fn test_complete_file_has_nothing_remaining() {
        let mut planner =
            ResumptionPlanner::with_prior_records(vec![record("done.bin", 2, 10, vec![])]);

        let plan = planner.plan("done.bin", 10);

        assert!(plan.is_complete());
        assert!(plan.remaining.is_empty());
        assert_eq!(plan.remaining_bytes(), 0);
    }

    #[test]
    fn test_size_mismatch_discards_prior_ranges() {
        let prior = vec![
            record(
                "grown.bin",
                3,
                100,
                vec![ByteRange::new(0, 10), ByteRange::new(50, 20), ByteRange::new(90, 10)],
            ),
            record("shrunk.bin", 9, 5000, vec![ByteRange::new(10, 10)]),
        ];
        let mut planner = ResumptionPlanner::with_prior_records(prior);
        assert_eq!(planner.next_seq_id(), 10);

        let grown = planner.plan("grown.bin", 200);
        assert_eq!(grown.status, ResumptionStatus::SizeMismatchSmaller);
        assert_eq!(grown.remaining, vec![ByteRange::whole(200)]);
        assert_eq!(grown.seq_id, 10);
        assert_eq!(grown.prev_seq_id, Some(3));

        let shrunk = planner.plan("shrunk.bin", 1000);
        assert_eq!(shrunk.status, ResumptionStatus::SizeMismatchLarger);
        assert_eq!(shrunk.remaining, vec![ByteRange::whole(1000)]);
        assert_eq!(shrunk.seq_id, 11);
        assert_eq!(shrunk.prev_seq_id, Some(9));
    }

    #[test]
    fn test_unrelated_paths_are_new() {
        let mut planner =
            ResumptionPlanner::with_prior_records(vec![record("a.txt", 0, 500, vec![])]);
        let plan = planner.plan("dir/a.txt", 500);
        assert_eq!(plan.status, ResumptionStatus::New);
        assert_eq!(plan.seq_id, 1);
    }
}
