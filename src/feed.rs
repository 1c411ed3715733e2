use std::{fmt, ops::Range, sync::Arc};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::{
    data::{metadata::DatasetMetadata, source::RowReader},
    error::{ConfigError, MarketGymResult},
};

/// How a feed is split into `n` worker feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SplitMode {
    /// The parent span is tiled into `n` disjoint sub-spans covering it
    /// exactly, in time order.
    Exclusive,

    /// Every worker receives the full parent span.
    Replicated,
}

/// Sequential, chunked access to one temporal partition of a dataset.
///
/// A feed owns a half-open row span `[start, end)` over its reader and hands
/// out at most `⌈span_len / n_chunks⌉` rows at a time, in ascending time
/// order. Chunk boundaries only bound peak memory; they never change which
/// rows exist or their order.
#[derive(Clone)]
pub struct MarketFeed {
    metadata: DatasetMetadata,
    reader: Arc<dyn RowReader>,
    span: Range<usize>,
    n_chunks: usize,
    cursor: usize,
}

impl fmt::Debug for MarketFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketFeed")
            .field("dataset", &self.metadata.name())
            .field("span", &self.span)
            .field("n_chunks", &self.n_chunks)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl MarketFeed {
    /// Creates a feed covering the reader's full horizon.
    pub fn new(
        metadata: DatasetMetadata,
        reader: Arc<dyn RowReader>,
        n_chunks: usize,
    ) -> MarketGymResult<Self> {
        if n_chunks == 0 {
            return Err(ConfigError::InvalidChunkCount(n_chunks).into());
        }
        let span = 0..reader.n_rows();
        Ok(Self {
            metadata,
            reader,
            span,
            n_chunks,
            cursor: 0,
        })
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Half-open row interval this feed covers on the underlying reader.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    pub fn n_chunks(&self) -> usize {
        self.n_chunks
    }

    /// Upper bound on rows materialized by a single [`next_chunk`](Self::next_chunk) call.
    pub fn max_chunk_rows(&self) -> usize {
        self.len().div_ceil(self.n_chunks)
    }

    // ============================================================================================
    // Splitting
    // ============================================================================================

    /// Splits the horizon into a train/test pair at `ratio`.
    ///
    /// `ratio == 1` yields the full horizon and no test feed. The two spans
    /// tile the parent exactly: row counts always sum to the parent's.
    pub fn split_ratio(&self, ratio: f64) -> MarketGymResult<(MarketFeed, Option<MarketFeed>)> {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::InvalidTrainRatio(ratio).into());
        }
        if ratio == 1.0 {
            return Ok((self.sub_feed(self.span.clone()), None));
        }

        let pivot = self.span.start + (self.len() as f64 * ratio) as usize;
        debug!(
            span = ?self.span,
            ratio,
            pivot,
            "splitting feed into train/test pair"
        );

        let train = self.sub_feed(self.span.start..pivot);
        let test = self.sub_feed(pivot..self.span.end);
        Ok((train, Some(test)))
    }

    /// Splits this feed into `n` worker feeds.
    ///
    /// Exclusive mode tiles the span into `n` equal sub-spans; a span that
    /// does not divide evenly, or whose sub-spans could no longer be chunked
    /// `n_chunks` ways, is a configuration error rather than a silent
    /// rounding that drops rows. Replicated mode yields `n` feeds over the
    /// identical full span.
    pub fn split_count(&self, n: usize, mode: SplitMode) -> MarketGymResult<Vec<MarketFeed>> {
        if n == 0 {
            return Err(ConfigError::InvalidSplitCount(n).into());
        }

        match mode {
            SplitMode::Replicated => Ok((0..n).map(|_| self.sub_feed(self.span.clone())).collect()),
            SplitMode::Exclusive => {
                let rows = self.len();
                if rows % n != 0 {
                    return Err(ConfigError::UnevenSplit { rows, parts: n }.into());
                }
                let part = rows / n;
                if part < self.n_chunks {
                    return Err(ConfigError::PartitionTooSmallForChunks {
                        rows,
                        parts: n,
                        n_chunks: self.n_chunks,
                    }
                    .into());
                }

                debug!(span = ?self.span, parts = n, part_len = part, "tiling feed");
                Ok((0..n)
                    .map(|i| {
                        let start = self.span.start + i * part;
                        self.sub_feed(start..start + part)
                    })
                    .collect())
            }
        }
    }

    fn sub_feed(&self, span: Range<usize>) -> MarketFeed {
        MarketFeed {
            metadata: self.metadata.clone(),
            reader: self.reader.clone(),
            span,
            n_chunks: self.n_chunks,
            cursor: 0,
        }
    }

    // ============================================================================================
    // Sequential chunked reads
    // ============================================================================================

    /// Materializes the next chunk, or `None` once the span is exhausted.
    ///
    /// Already-consumed chunks are never re-materialized; use
    /// [`rewind`](Self::rewind) to start over.
    pub fn next_chunk(&mut self) -> MarketGymResult<Option<Array2<f64>>> {
        while self.cursor < self.n_chunks {
            let range = self.chunk_range(self.cursor);
            self.cursor += 1;
            if range.is_empty() {
                continue;
            }
            return self.reader.read(range).map(Some);
        }
        Ok(None)
    }

    /// Restarts sequential reading at the span start.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.n_chunks
    }

    /// Row range of chunk `i`, proportional so the chunks tile the span.
    fn chunk_range(&self, i: usize) -> Range<usize> {
        let len = self.len();
        let start = self.span.start + i * len / self.n_chunks;
        let end = self.span.start + (i + 1) * len / self.n_chunks;
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        domain::{AssetSymbol, Resolution},
        metadata::ColumnSchema,
        source::InMemoryReader,
    };
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    // ============================================================================================
    // Test Helpers
    // ============================================================================================

    fn metadata() -> DatasetMetadata {
        DatasetMetadata::new(
            "crypto",
            [AssetSymbol::from("BTC")],
            Resolution::Minute(1),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            ColumnSchema::new(["close"], 0).unwrap(),
        )
        .unwrap()
    }

    /// Feed over `n_rows` ticks where row `i` holds price `i`.
    fn feed(n_rows: usize, n_chunks: usize) -> MarketFeed {
        let md = metadata();
        let rows = Array2::from_shape_fn((n_rows, 1), |(r, _)| r as f64);
        let reader = Arc::new(InMemoryReader::new(rows, &md).unwrap());
        MarketFeed::new(md, reader, n_chunks).unwrap()
    }

    fn drain(feed: &mut MarketFeed) -> Vec<f64> {
        let mut out = Vec::new();
        while let Some(chunk) = feed.next_chunk().unwrap() {
            out.extend(chunk.column(0).iter().copied());
        }
        out
    }

    // ============================================================================================
    // Ratio splits
    // ============================================================================================

    #[test]
    fn ratio_split_80_20_over_100_ticks() {
        let (train, test) = feed(100, 1).split_ratio(0.8).unwrap();
        let test = test.unwrap();
        assert_eq!(train.span(), 0..80);
        assert_eq!(test.span(), 80..100);
    }

    #[test]
    fn ratio_split_conserves_row_count_and_is_contiguous() {
        for n_rows in [7usize, 50, 99, 100, 128] {
            for ratio in [0.1, 0.33, 0.5, 0.8, 0.95] {
                let (train, test) = feed(n_rows, 1).split_ratio(ratio).unwrap();
                let test = test.unwrap();
                assert_eq!(train.len() + test.len(), n_rows);
                assert_eq!(train.span().end, test.span().start);
                assert_eq!(train.span().start, 0);
                assert_eq!(test.span().end, n_rows);
            }
        }
    }

    #[test]
    fn ratio_one_yields_no_test_feed() {
        let (train, test) = feed(100, 1).split_ratio(1.0).unwrap();
        assert_eq!(train.span(), 0..100);
        assert!(test.is_none());
    }

    #[test]
    fn ratio_outside_unit_interval_fails() {
        assert!(feed(100, 1).split_ratio(0.0).is_err());
        assert!(feed(100, 1).split_ratio(-0.5).is_err());
        assert!(feed(100, 1).split_ratio(1.5).is_err());
    }

    // ============================================================================================
    // Count splits
    // ============================================================================================

    #[test]
    fn exclusive_split_tiles_horizon_without_gaps() {
        let feeds = feed(100, 1).split_count(4, SplitMode::Exclusive).unwrap();
        let spans: Vec<_> = feeds.iter().map(|f| f.span()).collect();
        assert_eq!(spans, vec![0..25, 25..50, 50..75, 75..100]);
    }

    #[test]
    fn replicated_split_covers_full_horizon_per_worker() {
        let feeds = feed(100, 1).split_count(4, SplitMode::Replicated).unwrap();
        assert_eq!(feeds.len(), 4);
        for f in &feeds {
            assert_eq!(f.span(), 0..100);
        }
    }

    #[test]
    fn uneven_exclusive_split_fails_instead_of_dropping_rows() {
        let err = feed(100, 1).split_count(3, SplitMode::Exclusive);
        assert!(err.is_err());
    }

    #[test]
    fn exclusive_split_requires_chunkable_partitions() {
        // 100 rows into 50 parts gives 2-row partitions, not chunkable 4 ways.
        let err = feed(100, 4).split_count(50, SplitMode::Exclusive);
        assert!(err.is_err());
    }

    #[test]
    fn zero_split_count_fails() {
        assert!(feed(100, 1).split_count(0, SplitMode::Exclusive).is_err());
    }

    // ============================================================================================
    // Chunked reads
    // ============================================================================================

    #[test]
    fn chunked_read_returns_all_rows_in_order() {
        for n_chunks in [1usize, 2, 3, 7, 10] {
            let mut f = feed(10, n_chunks);
            let rows = drain(&mut f);
            let expected: Vec<f64> = (0..10).map(|i| i as f64).collect();
            assert_eq!(rows, expected, "n_chunks = {n_chunks}");
        }
    }

    #[test]
    fn chunks_never_exceed_ceil_bound() {
        let mut f = feed(10, 3);
        let bound = f.max_chunk_rows();
        assert_eq!(bound, 4);
        while let Some(chunk) = f.next_chunk().unwrap() {
            assert!(chunk.nrows() <= bound);
        }
    }

    #[test]
    fn more_chunks_than_rows_skips_empty_chunks() {
        let mut f = feed(3, 10);
        let rows = drain(&mut f);
        assert_eq!(rows, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn rewind_restarts_at_span_start() {
        let mut f = feed(6, 2);
        let first = drain(&mut f);
        assert!(f.is_exhausted());
        f.rewind();
        let second = drain(&mut f);
        assert_eq!(first, second);
    }

    #[test]
    fn sub_feed_reads_only_its_span() {
        let parent = feed(100, 1);
        let feeds = parent.split_count(4, SplitMode::Exclusive).unwrap();
        let mut third = feeds[2].clone();
        let rows = drain(&mut third);
        let expected: Vec<f64> = (50..75).map(|i| i as f64).collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn zero_chunks_rejected_at_construction() {
        let md = metadata();
        let rows = Array2::from_shape_fn((4, 1), |(r, _)| r as f64);
        let reader = Arc::new(InMemoryReader::new(rows, &md).unwrap());
        assert!(MarketFeed::new(md, reader, 0).is_err());
    }
}
