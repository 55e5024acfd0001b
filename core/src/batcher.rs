//! Splits record sequences into batches that respect the bound-parameter limit.

use std::iter::Enumerate;
use std::slice::{Chunks, ChunksMut};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error(
    "A single record needs {parameters_per_record} bound parameters but a statement allows at most {max_parameters}"
)]
pub struct RecordTooWideError {
    pub parameters_per_record: usize,
    pub max_parameters: usize,
}

/// Batch sizing for one operation shape.
///
/// Capacity is `max_parameters / parameters_per_record` and never zero. A
/// record without bound parameters still occupies one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batcher {
    parameters_per_record: usize,
    max_parameters: usize,
    capacity: usize,
}

impl Batcher {
    pub fn new(
        parameters_per_record: usize,
        max_parameters: usize,
    ) -> Result<Self, RecordTooWideError> {
        let per_record = parameters_per_record.max(1);

        if per_record > max_parameters {
            return Err(RecordTooWideError { parameters_per_record, max_parameters });
        }

        Ok(Self { parameters_per_record, max_parameters, capacity: max_parameters / per_record })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn parameters_per_record(&self) -> usize {
        self.parameters_per_record
    }

    pub fn max_parameters(&self) -> usize {
        self.max_parameters
    }

    pub fn batch_count(&self, records: usize) -> usize {
        records.div_ceil(self.capacity)
    }

    /// Lazily yields the batches of `records` in input order. Calling `split`
    /// again starts over from the first record.
    pub fn split<'a, T>(&self, records: &'a [T]) -> Batches<'a, T> {
        Batches { chunks: records.chunks(self.capacity).enumerate(), capacity: self.capacity }
    }

    /// Same as [`split`](Self::split) but hands out mutable batches so output
    /// values can be written back onto the records.
    pub fn split_mut<'a, T>(&self, records: &'a mut [T]) -> BatchesMut<'a, T> {
        BatchesMut { chunks: records.chunks_mut(self.capacity).enumerate(), capacity: self.capacity }
    }
}

/// An ordered slice of the input. Record `i` of the slice has ordinal `i`.
#[derive(Debug, PartialEq, Eq)]
pub struct Batch<R> {
    pub index: usize,
    /// Position of the first record of this batch in the input sequence.
    pub offset: usize,
    pub records: R,
}

pub struct Batches<'a, T> {
    chunks: Enumerate<Chunks<'a, T>>,
    capacity: usize,
}

impl<'a, T> Iterator for Batches<'a, T> {
    type Item = Batch<&'a [T]>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, records) = self.chunks.next()?;
        Some(Batch { index, offset: index * self.capacity, records })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

pub struct BatchesMut<'a, T> {
    chunks: Enumerate<ChunksMut<'a, T>>,
    capacity: usize,
}

impl<'a, T> Iterator for BatchesMut<'a, T> {
    type Item = Batch<&'a mut [T]>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, records) = self.chunks.next()?;
        Some(Batch { index, offset: index * self.capacity, records })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_floor_of_budget() {
        assert_eq!(Batcher::new(3, 10).unwrap().capacity(), 3);
        assert_eq!(Batcher::new(5, 65535).unwrap().capacity(), 13107);
        assert_eq!(Batcher::new(10, 10).unwrap().capacity(), 1);
    }

    #[test]
    fn test_record_too_wide() {
        let err = Batcher::new(11, 10).unwrap_err();
        assert_eq!(err, RecordTooWideError { parameters_per_record: 11, max_parameters: 10 });

        assert!(Batcher::new(0, 0).is_err());
    }

    #[test]
    fn test_zero_parameters_per_record() {
        let batcher = Batcher::new(0, 4).unwrap();
        assert_eq!(batcher.capacity(), 4);
    }

    #[test]
    fn test_sizes_sum_and_order_is_preserved() {
        for n in 0..40usize {
            for per_record in 1..6usize {
                let records: Vec<usize> = (0..n).collect();
                let batcher = Batcher::new(per_record, 17).unwrap();
                let cap = 17 / per_record;

                let batches: Vec<_> = batcher.split(&records).collect();
                assert_eq!(batches.len(), batcher.batch_count(n));
                assert!(batches.iter().all(|b| !b.records.is_empty() && b.records.len() <= cap));

                let rebuilt: Vec<usize> =
                    batches.iter().flat_map(|b| b.records.iter().copied()).collect();
                assert_eq!(rebuilt, records);

                for batch in &batches {
                    assert_eq!(batch.records[0], batch.offset);
                }
            }
        }
    }

    #[test]
    fn test_exact_capacity_boundary() {
        let batcher = Batcher::new(2, 10).unwrap();

        let records: Vec<u32> = (0..5).collect();
        assert_eq!(batcher.split(&records).count(), 1);

        let records: Vec<u32> = (0..6).collect();
        let batches: Vec<_> = batcher.split(&records).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].records, &[5]);
        assert_eq!(batches[1].offset, 5);
        assert_eq!(batches[1].index, 1);
    }

    #[test]
    fn test_split_restarts_from_the_start() {
        let batcher = Batcher::new(1, 2).unwrap();
        let records = vec!['a', 'b', 'c'];

        let first: Vec<_> = batcher.split(&records).map(|b| b.records.to_vec()).collect();
        let second: Vec<_> = batcher.split(&records).map(|b| b.records.to_vec()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![vec!['a', 'b'], vec!['c']]);
    }

    #[test]
    fn test_split_mut_writes_through() {
        let batcher = Batcher::new(1, 2).unwrap();
        let mut records = vec![0, 0, 0];

        for batch in batcher.split_mut(&mut records) {
            for (ordinal, record) in batch.records.iter_mut().enumerate() {
                *record = batch.offset + ordinal;
            }
        }

        assert_eq!(records, vec![0, 1, 2]);
    }
}
