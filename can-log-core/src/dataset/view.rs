//! Filtered views over a dataset
//!
//! A [`FilterHandle`] never copies records and never stores the list of
//! matching indices. Building one counts matches per fixed-size block of
//! records (in parallel) and keeps only the prefix sums of those counts, so
//! memory grows with `records / block_size`. Resolving filtered position `i`
//! is a binary search over the prefix sums followed by a scan of one block;
//! the offsets of recently scanned blocks are cached.

use crate::dataset::filter::{CompiledFilter, FilterSpec};
use crate::dataset::DatasetId;
use crate::types::LogRecord;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Scanned blocks kept per handle
const BLOCK_CACHE_CAPACITY: usize = 8;

/// An applied filter, bound to the dataset it was built from
#[derive(Debug)]
pub struct FilterHandle {
    spec: FilterSpec,
    compiled: CompiledFilter,
    dataset_id: DatasetId,
    record_count: usize,
    block_size: usize,
    /// Unconfigured spec: filtered position equals record index
    identity: bool,
    /// `prefix[b]` is the number of matches in blocks `0..b`
    prefix: Vec<usize>,
    cache: Mutex<VecDeque<(usize, Arc<[u32]>)>>,
}

impl FilterHandle {
    pub(crate) fn build(dataset_id: DatasetId, records: &[LogRecord], spec: &FilterSpec, block_size: usize) -> Self {
        let compiled = spec.compile();
        let identity = spec.is_unconfigured();
        let block_size = block_size.max(1);

        let prefix = if identity {
            Vec::new()
        } else {
            let counts: Vec<usize> = records
                .par_chunks(block_size)
                .map(|block| block.iter().filter(|r| compiled.matches(&r.frame)).count())
                .collect();
            let mut prefix = Vec::with_capacity(counts.len() + 1);
            let mut total = 0usize;
            prefix.push(0);
            for count in counts {
                total += count;
                prefix.push(total);
            }
            prefix
        };

        let handle = Self {
            spec: spec.clone(),
            compiled,
            dataset_id,
            record_count: records.len(),
            block_size,
            identity,
            prefix,
            cache: Mutex::new(VecDeque::with_capacity(BLOCK_CACHE_CAPACITY)),
        };
        log::debug!(
            "Filter [{}] on dataset {}: {} of {} records",
            handle.spec,
            dataset_id,
            handle.count(),
            handle.record_count
        );
        handle
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn dataset_id(&self) -> DatasetId {
        self.dataset_id
    }

    /// Number of records passing the filter
    pub fn count(&self) -> usize {
        if self.identity {
            self.record_count
        } else {
            self.prefix.last().copied().unwrap_or(0)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub(crate) fn belongs_to(&self, dataset_id: DatasetId, record_count: usize) -> bool {
        let ok = self.dataset_id == dataset_id && self.record_count == record_count;
        if !ok {
            log::warn!(
                "Filter handle of dataset {} used with dataset {}",
                self.dataset_id,
                dataset_id
            );
        }
        ok
    }

    /// Record index of filtered position `position`
    pub(crate) fn position(&self, records: &[LogRecord], position: usize) -> Option<usize> {
        if position >= self.count() {
            return None;
        }
        if self.identity {
            return Some(position);
        }
        let block = self.prefix.partition_point(|&p| p <= position) - 1;
        let offsets = self.block_offsets(records, block);
        let within = position - self.prefix[block];
        offsets.get(within).map(|&offset| block * self.block_size + offset as usize)
    }

    /// Lazy iterator over record indices from filtered position `start`
    pub(crate) fn iter_from<'a>(&'a self, records: &'a [LogRecord], start: usize) -> FilteredIndices<'a> {
        let remaining = self.count().saturating_sub(start);
        let next = self.position(records, start).unwrap_or(records.len());
        FilteredIndices {
            records,
            filter: &self.compiled,
            identity: self.identity,
            next,
            remaining,
        }
    }

    fn block_offsets(&self, records: &[LogRecord], block: usize) -> Arc<[u32]> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = cache.iter().position(|(b, _)| *b == block) {
            if let Some(entry) = cache.remove(slot) {
                let offsets = Arc::clone(&entry.1);
                cache.push_front(entry);
                return offsets;
            }
        }

        let start = block * self.block_size;
        let end = (start + self.block_size).min(records.len());
        let offsets: Arc<[u32]> = records[start..end]
            .iter()
            .enumerate()
            .filter(|(_, r)| self.compiled.matches(&r.frame))
            .map(|(i, _)| i as u32)
            .collect();

        if cache.len() == BLOCK_CACHE_CAPACITY {
            cache.pop_back();
        }
        cache.push_front((block, Arc::clone(&offsets)));
        offsets
    }
}

/// Record indices passing a filter, in original order
pub struct FilteredIndices<'a> {
    records: &'a [LogRecord],
    filter: &'a CompiledFilter,
    identity: bool,
    next: usize,
    remaining: usize,
}

impl Iterator for FilteredIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.remaining > 0 && self.next < self.records.len() {
            let index = self.next;
            self.next += 1;
            if self.identity || self.filter.matches(&self.records[index].frame) {
                self.remaining -= 1;
                return Some(index);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
