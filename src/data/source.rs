use rand::seq::SliceRandom;
use rand_xorshift::XorShiftRng;

use crate::data::{Example, Image, LabeledBatch};
use crate::error::{CrowdError, Result};
use crate::utils::seeded_rng;

/// Supplier of training batches. Both streams are infinite; a call may
/// block until a batch is available.
pub trait DataSource {
    fn next_labeled_batch(&mut self) -> Result<LabeledBatch>;
    fn next_unlabeled_batch(&mut self) -> Result<Vec<Image>>;
}

/// An infinite, reshuffled-every-epoch stream of fixed-size batches over an
/// in-memory dataset. An epoch whose remainder is smaller than the batch
/// size is completed from the start of the next shuffle.
#[derive(Clone)]
pub struct CyclicBatches<T> {
    items: Vec<T>,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    rng: XorShiftRng,
}

impl<T: Clone> CyclicBatches<T> {

    pub fn new(items: Vec<T>, batch_size: usize, seed: u64) -> Result<Self> {
        if items.is_empty() {
            return Err(CrowdError::EmptyDataset);
        }
        assert!(batch_size > 0);
        let mut rng = seeded_rng("cyclic batches", seed);
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.shuffle(&mut rng);
        Ok(CyclicBatches {
            items,
            order,
            cursor: 0,
            batch_size,
            rng,
        })
    }

    pub fn next_batch(&mut self) -> Vec<T> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            if self.cursor == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            batch.push(self.items[self.order[self.cursor]].clone());
            self.cursor += 1;
        }
        batch
    }

}

impl<T: Clone> Iterator for CyclicBatches<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

pub struct InMemorySource {
    labeled: CyclicBatches<Example>,
    unlabeled: CyclicBatches<Image>,
}

impl InMemorySource {

    pub fn new(labeled: Vec<Example>, unlabeled: Vec<Image>, batch_size: usize, seed: u64) -> Result<Self> {
        Ok(InMemorySource {
            labeled: CyclicBatches::new(labeled, batch_size, seed)?,
            unlabeled: CyclicBatches::new(unlabeled, batch_size, seed.wrapping_add(1))?,
        })
    }

    pub fn into_streams(self) -> (CyclicBatches<Example>, CyclicBatches<Image>) {
        (self.labeled, self.unlabeled)
    }

}

impl DataSource for InMemorySource {

    fn next_labeled_batch(&mut self) -> Result<LabeledBatch> {
        Ok(LabeledBatch::from_examples(self.labeled.next_batch()))
    }

    fn next_unlabeled_batch(&mut self) -> Result<Vec<Image>> {
        Ok(self.unlabeled.next_batch())
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_item_once_per_epoch() {
        let mut batches = CyclicBatches::new((0..6).collect::<Vec<u32>>(), 3, 7).unwrap();
        let mut seen = HashSet::new();
        for _ in 0..2 {
            for item in batches.next_batch() {
                assert!(seen.insert(item));
            }
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_batches_are_full_across_epochs() {
        let batches = CyclicBatches::new(vec![1, 2], 3, 0).unwrap();
        for batch in batches.take(5) {
            assert_eq!(batch.len(), 3);
        }
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        assert!(CyclicBatches::<u32>::new(Vec::new(), 3, 0).is_err());
    }

}
