//! Chunk arithmetic shared by the upload and download pipelines.

use serde::{Deserialize, Serialize};

/// A contiguous byte interval `[start, end)` of a file or remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Inclusive last byte, as used in `Range` headers.
    pub fn last_byte(&self) -> u64 {
        self.end - 1
    }

    /// `bytes=<start>-<end>` with an inclusive end.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.last_byte())
    }
}

/// Splits `total_size` bytes into `chunk_size` pieces, in ascending order.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// `chunk_size` must be non-zero; `TransferConfig::validate` guarantees it.
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        debug_assert!(chunk_size > 0);
        Self { total_size, chunk_size }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size)
    }

    pub fn range(&self, index: u64) -> Option<ByteRange> {
        if index >= self.total_chunks() {
            return None;
        }
        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_size);
        Some(ByteRange { index, start, end })
    }

    /// Ranges from `first` to the end of the plan.
    pub fn ranges_from(&self, first: u64) -> impl Iterator<Item = ByteRange> + '_ {
        (first..self.total_chunks()).filter_map(move |i| self.range(i))
    }

    pub fn ranges(&self) -> impl Iterator<Item = ByteRange> + '_ {
        self.ranges_from(0)
    }
}

/// `round(done / total * 100)`, with halves rounded up. Held at 99 until
/// `done == total` so that 100 always means complete.
pub fn percentage(done: u64, total: u64) -> u8 {
    if total == 0 || done >= total {
        return 100;
    }
    let rounded = (done as u128 * 200 + total as u128) / (total as u128 * 2);
    rounded.min(99) as u8
}

/// Client-side snapshot emitted after each acknowledged chunk.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub chunks_uploaded: u64,
    pub total_chunks: u64,
    pub percentage: u8,
}

impl UploadProgress {
    pub fn new(chunks_uploaded: u64, total_chunks: u64) -> Self {
        Self {
            chunks_uploaded,
            total_chunks,
            percentage: percentage(chunks_uploaded, total_chunks),
        }
    }
}

/// Snapshot emitted after each fetched range.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub percentage: u8,
}

impl DownloadProgress {
    pub fn new(bytes_downloaded: u64, total_bytes: u64) -> Self {
        Self {
            bytes_downloaded,
            total_bytes,
            percentage: percentage(bytes_downloaded, total_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_chunks_is_ceiling() {
        assert_eq!(ChunkPlan::new(0, 512).total_chunks(), 0);
        assert_eq!(ChunkPlan::new(1, 512).total_chunks(), 1);
        assert_eq!(ChunkPlan::new(512, 512).total_chunks(), 1);
        assert_eq!(ChunkPlan::new(513, 512).total_chunks(), 2);
        assert_eq!(ChunkPlan::new(1_000_000, 524_288).total_chunks(), 2);
    }

    #[test]
    fn ranges_partition_the_file() {
        for size in [1u64, 7, 8, 9, 63, 64, 65, 1000] {
            let plan = ChunkPlan::new(size, 8);
            let mut expected_start = 0;
            for (i, range) in plan.ranges().enumerate() {
                assert_eq!(range.index, i as u64);
                assert_eq!(range.start, expected_start);
                assert!(!range.is_empty());
                assert!(range.len() <= 8);
                expected_start = range.end;
            }
            assert_eq!(expected_start, size);
        }
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let plan = ChunkPlan::new(4 * 1024, 1024);
        assert!(plan.ranges().all(|r| r.len() == 1024));

        let plan = ChunkPlan::new(4 * 1024 + 1, 1024);
        let last = plan.range(plan.total_chunks() - 1).unwrap();
        assert_eq!(last.len(), 1);
    }

    #[test]
    fn upload_scenario() {
        let plan = ChunkPlan::new(1_000_000, 524_288);
        let ranges: Vec<_> = plan.ranges().collect();
        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].start, ranges[0].end), (0, 524_288));
        assert_eq!((ranges[1].start, ranges[1].end), (524_288, 1_000_000));
    }

    #[test]
    fn download_scenario_headers() {
        let plan = ChunkPlan::new(2_500_000, 1_048_576);
        let headers: Vec<_> = plan.ranges().map(|r| r.header_value()).collect();
        assert_eq!(
            headers,
            vec![
                "bytes=0-1048575",
                "bytes=1048576-2097151",
                "bytes=2097152-2499999",
            ]
        );
    }

    #[test]
    fn ranges_from_skips_confirmed() {
        let plan = ChunkPlan::new(30, 10);
        let starts: Vec<_> = plan.ranges_from(2).map(|r| r.start).collect();
        assert_eq!(starts, vec![20]);
        assert_eq!(plan.ranges_from(3).count(), 0);
        assert!(plan.range(3).is_none());
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(3, 3), 100);
        assert_eq!(percentage(0, 0), 100);
    }

    #[test]
    fn percentage_only_reaches_100_at_the_end() {
        let total = 1000;
        let mut last = 0;
        for done in 0..total {
            let p = percentage(done, total);
            assert!(p < 100);
            assert!(p >= last);
            last = p;
        }
        assert_eq!(percentage(999, 1000), 99);
        assert_eq!(percentage(total, total), 100);
    }
}
