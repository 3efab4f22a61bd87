use ndarray::Array2;

use crate::{EngineErr, Result, embedding::Key};

/// The keys of a batch for one embedding table in compressed row form.
///
/// Row `sample * slots + slot` holds the keys of that slot of that sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseInput<K> {
    slots: usize,
    row_offsets: Vec<usize>,
    keys: Vec<K>,
}

impl<K: Key> SparseInput<K> {
    pub fn new(slots: usize) -> Self {
        Self {
            slots,
            row_offsets: vec![0],
            keys: Vec::new(),
        }
    }

    /// Appends a sample given as one key list per slot.
    ///
    /// # Returns
    /// `SizeMismatch` if the sample doesn't have exactly `slots` slots.
    pub fn push_sample(&mut self, sample: &[Vec<K>]) -> Result<()> {
        EngineErr::size_check("sample slots", sample.len(), self.slots)?;

        for slot in sample {
            self.keys.extend_from_slice(slot);
            self.row_offsets.push(self.keys.len());
        }

        Ok(())
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn batch_size(&self) -> usize {
        (self.row_offsets.len() - 1)
            .checked_div(self.slots)
            .unwrap_or(0)
    }

    /// Every key of the batch, in row order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn slot_keys(&self, sample: usize, slot: usize) -> &[K] {
        let row = sample * self.slots + slot;
        &self.keys[self.row_offsets[row]..self.row_offsets[row + 1]]
    }
}

/// The input a single device consumes in one iteration.
#[derive(Debug, Clone)]
pub struct Batch<K> {
    pub labels: Vec<f32>,
    /// The `[batch, dense_dim]` dense features.
    pub dense: Array2<f32>,
    /// One sparse input per embedding table.
    pub sparse: Vec<SparseInput<K>>,
}

impl<K: Key> Batch<K> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A single labeled sample, as produced by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<K> {
    pub label: f32,
    pub dense: Vec<f32>,
    /// Indexed by table, then slot.
    pub keys: Vec<Vec<Vec<K>>>,
}

/// The shape every batch of a reader has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShape {
    pub batch_size: usize,
    pub dense_dim: usize,
    /// The amount of slots of every table.
    pub slots: Vec<usize>,
}

impl BatchShape {
    /// Assembles `samples` into a batch, checking each of them against the shape.
    pub fn assemble<K: Key>(&self, samples: Vec<Sample<K>>) -> Result<Batch<K>> {
        let mut labels = Vec::with_capacity(samples.len());
        let mut dense = Vec::with_capacity(samples.len() * self.dense_dim);
        let mut sparse: Vec<_> = self.slots.iter().map(|&n| SparseInput::new(n)).collect();

        for sample in samples {
            EngineErr::size_check("sample dense features", sample.dense.len(), self.dense_dim)?;
            EngineErr::size_check("sample tables", sample.keys.len(), sparse.len())?;

            labels.push(sample.label);
            dense.extend(sample.dense);
            for (input, keys) in sparse.iter_mut().zip(&sample.keys) {
                input.push_sample(keys)?;
            }
        }

        let dense = Array2::from_shape_vec((labels.len(), self.dense_dim), dense).map_err(|e| {
            EngineErr::InvalidArgument(format!("dense features don't fit the batch: {e}"))
        })?;

        Ok(Batch {
            labels,
            dense,
            sparse,
        })
    }
}
