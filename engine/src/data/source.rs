use std::marker::PhantomData;

use rand::{Rng, SeedableRng, rngs::StdRng};
use specs::SampleSpec;

use super::Sample;
use crate::{EngineErr, Result, embedding::Key};

/// Where a data reader pulls its samples from.
pub trait BatchSource<K: Key>: Send {
    /// The next sample, `None` once the source is exhausted.
    fn next_sample(&mut self) -> Option<Result<Sample<K>>>;

    /// Starts the source over from its first sample.
    fn rewind(&mut self);
}

/// A seeded simulator of click logs.
///
/// Dense features are uniform in `[0, 1)`, keys are uniform in
/// `[0, key_range)` and labels are clicks with a probability that grows with
/// the first dense feature, so that the data is learnable.
pub struct SyntheticSource<K> {
    samples: usize,
    key_range: u64,
    nnz_per_slot: usize,
    seed: u64,
    dense_dim: usize,
    slots: Vec<usize>,
    rng: StdRng,
    produced: usize,
    _key: PhantomData<K>,
}

impl<K: Key> SyntheticSource<K> {
    /// Creates a new `SyntheticSource`.
    ///
    /// # Arguments
    /// * `samples` - The amount of samples in one pass.
    /// * `key_range` - The exclusive upper bound of the generated keys.
    /// * `nnz_per_slot` - The amount of keys in every slot.
    /// * `seed` - The seed of the simulator, every pass repeats the same samples.
    /// * `dense_dim` - The amount of dense features per sample.
    /// * `slots` - The amount of slots of every table.
    ///
    /// # Returns
    /// A new `SyntheticSource` or `InvalidArgument` if the keys don't fit `K`.
    pub fn new(
        samples: usize,
        key_range: u64,
        nnz_per_slot: usize,
        seed: u64,
        dense_dim: usize,
        slots: Vec<usize>,
    ) -> Result<Self> {
        if key_range == 0 || K::from_bits(key_range - 1).is_none() {
            return Err(EngineErr::InvalidArgument(format!(
                "key range {key_range} is empty or too wide for the key type"
            )));
        }

        Ok(Self {
            samples,
            key_range,
            nnz_per_slot,
            seed,
            dense_dim,
            slots,
            rng: StdRng::seed_from_u64(seed),
            produced: 0,
            _key: PhantomData,
        })
    }

    fn key(&mut self) -> Result<K> {
        let bits = self.rng.random_range(0..self.key_range);
        K::from_bits(bits).ok_or_else(|| EngineErr::InvalidArgument(format!("key {bits} overflows")))
    }
}

impl<K: Key> BatchSource<K> for SyntheticSource<K> {
    fn next_sample(&mut self) -> Option<Result<Sample<K>>> {
        if self.produced == self.samples {
            return None;
        }
        self.produced += 1;

        let dense: Vec<f32> = (0..self.dense_dim).map(|_| self.rng.random()).collect();
        let p = 0.25 + 0.5 * dense.first().copied().unwrap_or(0.5);
        let label = if self.rng.random_bool(p as f64) { 1. } else { 0. };

        let mut keys = Vec::with_capacity(self.slots.len());
        for table in 0..self.slots.len() {
            let mut slots = Vec::with_capacity(self.slots[table]);
            for _ in 0..self.slots[table] {
                let slot = (0..self.nnz_per_slot)
                    .map(|_| self.key())
                    .collect::<Result<Vec<_>>>();
                match slot {
                    Ok(slot) => slots.push(slot),
                    Err(e) => return Some(Err(e)),
                }
            }
            keys.push(slots);
        }

        Some(Ok(Sample { label, dense, keys }))
    }

    fn rewind(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.produced = 0;
    }
}

/// A source replaying a fixed list of samples.
pub struct InMemorySource<K> {
    samples: Vec<Sample<K>>,
    cursor: usize,
}

impl<K: Key> InMemorySource<K> {
    pub fn new(samples: Vec<Sample<K>>) -> Self {
        Self { samples, cursor: 0 }
    }

    /// Converts samples given in the configuration to the key type `K`.
    ///
    /// # Returns
    /// `InvalidArgument` if a key doesn't fit `K`.
    pub fn from_specs(specs: &[SampleSpec]) -> Result<Self> {
        let samples = specs
            .iter()
            .map(|spec| -> Result<Sample<K>> {
                let keys = spec
                    .keys
                    .iter()
                    .map(|table| {
                        table
                            .iter()
                            .map(|slot| slot.iter().map(|&key| convert(key)).collect::<Result<Vec<K>>>())
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(Sample {
                    label: spec.label,
                    dense: spec.dense.clone(),
                    keys,
                })
            })
            .collect::<Result<_>>()?;

        Ok(Self::new(samples))
    }
}

fn convert<K: Key>(key: i64) -> Result<K> {
    K::from_bits(key as u64)
        .ok_or_else(|| EngineErr::InvalidArgument(format!("key {key} doesn't fit the key type")))
}

impl<K: Key> BatchSource<K> for InMemorySource<K> {
    fn next_sample(&mut self) -> Option<Result<Sample<K>>> {
        let sample = self.samples.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(Ok(sample))
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<K: Key>(source: &mut dyn BatchSource<K>) -> Vec<Sample<K>> {
        std::iter::from_fn(|| source.next_sample())
            .collect::<Result<_>>()
            .unwrap()
    }

    #[test]
    fn synthetic_passes_repeat_after_rewind() {
        let mut source = SyntheticSource::<u32>::new(10, 50, 2, 3, 4, vec![2, 1]).unwrap();

        let first = drain(&mut source);
        source.rewind();
        let second = drain(&mut source);

        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
        assert!(first.iter().all(|s| s.keys[0].len() == 2 && s.keys[1][0].len() == 2));
        assert!(first.iter().flat_map(|s| s.keys.concat().concat()).all(|k| k < 50));
    }

    #[test]
    fn synthetic_rejects_keys_wider_than_the_type() {
        assert!(SyntheticSource::<u32>::new(1, 1 << 40, 1, 0, 0, vec![1]).is_err());
        assert!(SyntheticSource::<i64>::new(1, 1 << 40, 1, 0, 0, vec![1]).is_ok());
    }

    #[test]
    fn inline_specs_convert_their_keys() {
        let specs = [SampleSpec {
            label: 1.,
            dense: vec![0.5],
            keys: vec![vec![vec![3, -1]]],
        }];

        assert!(InMemorySource::<u32>::from_specs(&specs).is_err());

        let mut source = InMemorySource::<i64>::from_specs(&specs).unwrap();
        assert_eq!(drain(&mut source)[0].keys, [[[3, -1]]]);
        assert!(source.next_sample().is_none());
    }
}
