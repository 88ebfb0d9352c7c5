//! Splitting planned ranges into fixed-size blocks.

use crate::source::byte_source::FileByteSource;
use crate::source::metadata::{ByteRange, FileMetadata};
use std::sync::Arc;

/// Cuts each remaining range of a file into blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFactory {
    block_size: Option<u64>,
}

impl ChunkFactory {
    /// `None` disables splitting: every range becomes exactly one block
    pub fn new(block_size: Option<u64>) -> Self {
        Self {
            block_size: block_size.filter(|&size| size > 0),
        }
    }

    pub fn block_size(&self) -> Option<u64> {
        self.block_size
    }

    /// Block placements for one range.
    ///
    /// An empty range still yields one zero-length block so empty files are
    /// scheduled like any other.
    pub fn split(&self, range: ByteRange) -> Vec<ByteRange> {
        let block_size = self.block_size.unwrap_or_else(|| range.len().max(1));
        let mut blocks = Vec::with_capacity(range.len().div_ceil(block_size).max(1) as usize);
        let mut offset = range.start;
        let mut remaining = range.len();
        loop {
            let size = remaining.min(block_size);
            blocks.push(ByteRange::new(offset, size));
            remaining -= size;
            offset += size;
            if remaining == 0 {
                break;
            }
        }
        blocks
    }

    /// Blocks for every remaining range of a file, in range order
    pub fn blocks(
        &self,
        metadata: &Arc<FileMetadata>,
        remaining: &[ByteRange],
    ) -> Vec<FileByteSource> {
        remaining
            .iter()
            .flat_map(|range| self.split(*range))
            .map(|block| FileByteSource::new(Arc::clone(metadata), block.len(), block.start))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::metadata::ResumptionStatus;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn metadata(size: u64) -> Arc<FileMetadata> {
        Arc::new(FileMetadata {
            full_path: PathBuf::from("/data/b.txt"),
            rel_path: "b.txt".to_string(),
            seq_id: 1,
            size,
            status: ResumptionStatus::New,
            prev_seq_id: None,
        })
    }

    #[test]
    fn test_split_with_tail() {
        let factory = ChunkFactory::new(Some(1000));
        let blocks = factory.split(ByteRange::whole(1500));
        assert_eq!(blocks, vec![ByteRange::new(0, 1000), ByteRange::new(1000, 500)]);
    }

    #[test]
    fn test_split_smaller_than_block() {
        let factory = ChunkFactory::new(Some(1000));
        assert_eq!(factory.split(ByteRange::whole(500)), vec![ByteRange::whole(500)]);
    }

    #[test]
    fn test_split_disabled_keeps_whole_range() {
        let factory = ChunkFactory::new(None);
        let range = ByteRange::new(100, 10_000_000);
        assert_eq!(factory.split(range), vec![range]);
        assert_eq!(ChunkFactory::new(Some(0)).block_size(), None);
    }

    #[test]
    fn test_empty_range_yields_one_empty_block() {
        let factory = ChunkFactory::new(Some(1000));
        assert_eq!(factory.split(ByteRange::whole(0)), vec![ByteRange::whole(0)]);
        assert_eq!(ChunkFactory::new(None).split(ByteRange::whole(0)).len(), 1);
    }

    #[test]
    fn test_blocks_share_metadata() {
        let factory = ChunkFactory::new(Some(100));
        let meta = metadata(500);
        let ranges = [ByteRange::new(100, 250), ByteRange::new(400, 100)];
        let blocks = factory.blocks(&meta, &ranges);

        let placements: Vec<(u64, u64)> = blocks.iter().map(|b| (b.offset(), b.size())).collect();
        assert_eq!(placements, vec![(100, 100), (200, 100), (300, 50), (400, 100)]);
        assert!(blocks.iter().all(|b| Arc::ptr_eq(b.metadata(), &meta)));
        assert_eq!(Arc::strong_count(&meta), 5);
    }

    proptest! {
        #[test]
        fn prop_blocks_cover_range_exactly(
            start in 0u64..1_000_000,
            len in 0u64..200_000,
            block_size in 1u64..50_000,
        ) {
            let factory = ChunkFactory::new(Some(block_size));
            let range = ByteRange::new(start, len);
            let blocks = factory.split(range);

            let total: u64 = blocks.iter().map(ByteRange::len).sum();
            prop_assert_eq!(total, len);
            prop_assert_eq!(blocks[0].start, start);
            for pair in blocks.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
                prop_assert_eq!(pair[0].len(), block_size);
            }
            prop_assert!(blocks.iter().all(|b| b.len() <= block_size));
        }
    }
}
