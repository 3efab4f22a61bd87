use std::{collections::BTreeMap, sync::Arc};

use log::debug;
use ndarray::{ArrayView2, ArrayViewMut2, s};
use rayon::prelude::*;
use specs::{CombinerSpec, EmbeddingSpec, OptimizerSpec};

use super::{Embedding, EmbeddingShard, Key, SparseGrad, SparseRows};
use crate::{
    EngineErr, Result,
    data::SparseInput,
    device::DeviceGroup,
    initialization::Dist,
    optimization,
    storage::{Buffer, Element},
};

/// An embedding table hash partitioned over every device of a group.
///
/// Key `k` lives in the shard of device `k.owner(devices)`. Lookups read
/// across shards, while inserts and updates of a shard only ever run on the
/// stream of its own device.
pub struct DistributedEmbedding<K: Key, G: Element> {
    group: Arc<DeviceGroup>,
    slots: usize,
    vec_size: usize,
    combiner: CombinerSpec,
    shards: Vec<EmbeddingShard<K, G>>,
}

impl<K: Key, G: Element> DistributedEmbedding<K, G> {
    /// Creates a new `DistributedEmbedding` with one empty shard per device.
    ///
    /// # Arguments
    /// * `group` - The devices to spread the table over.
    /// * `spec` - The table's specification.
    /// * `optimizer` - The optimizer every shard gets an instance of.
    /// * `loss_scale` - The factor the gradients are scaled by.
    /// * `seed` - The seed new rows are initialized from.
    ///
    /// # Returns
    /// A new `DistributedEmbedding` or an error if the specification is
    /// invalid or the shards don't fit their devices.
    pub fn new(
        group: &Arc<DeviceGroup>,
        spec: &EmbeddingSpec,
        optimizer: &OptimizerSpec,
        loss_scale: f32,
        seed: u64,
    ) -> Result<Self> {
        let EmbeddingSpec {
            slots,
            vec_size,
            max_vocabulary_per_device: capacity,
            combiner,
            ref init,
        } = *spec;

        if slots == 0 || vec_size == 0 || capacity == 0 {
            return Err(EngineErr::InvalidArgument(format!(
                "embedding needs non zero slots, vector size and vocabulary, got {slots}, {vec_size} and {capacity}"
            )));
        }

        let dist = Dist::new(init)?;
        let shards = group
            .iter()
            .map(|device| {
                EmbeddingShard::new(
                    Arc::clone(device),
                    vec_size,
                    capacity,
                    optimization::build::<G>(optimizer, capacity * vec_size, loss_scale),
                    dist,
                    seed,
                )
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            group: Arc::clone(group),
            slots,
            vec_size,
            combiner,
            shards,
        })
    }

    pub fn shards(&self) -> &[EmbeddingShard<K, G>] {
        &self.shards
    }

    fn check_input(&self, input: &SparseInput<K>) -> Result<()> {
        EngineErr::size_check("embedding input slots", input.slots(), self.slots)
    }

    fn check_output(&self, input: &SparseInput<K>, dim: (usize, usize)) -> Result<()> {
        self.check_input(input)?;
        EngineErr::size_check("embedding batch", dim.0, input.batch_size())?;
        EngineErr::size_check("embedding output", dim.1, self.output_dim())
    }

    fn weight(&self, keys: usize) -> f32 {
        match self.combiner {
            CombinerSpec::Sum => 1.,
            CombinerSpec::Mean => 1. / keys as f32,
        }
    }

    /// Runs `f` for every shard on its own device's stream, in parallel.
    fn for_each_shard<T, F>(&mut self, work: Vec<T>, f: F) -> Result<()>
    where
        T: Send,
        F: Fn(&mut EmbeddingShard<K, G>, T) -> Result<()> + Sync,
    {
        self.shards
            .par_iter_mut()
            .zip(work)
            .try_for_each(|(shard, work)| {
                let device = Arc::clone(shard.device());
                device.stream().run(|| f(shard, work))
            })
    }
}

impl<K: Key, G: Element> Embedding<K, G> for DistributedEmbedding<K, G> {
    fn slots(&self) -> usize {
        self.slots
    }

    fn vec_size(&self) -> usize {
        self.vec_size
    }

    fn prepare(&mut self, inputs: &[&SparseInput<K>]) -> Result<()> {
        let n = self.shards.len();
        let mut routed = vec![Vec::new(); n];

        for input in inputs {
            self.check_input(input)?;

            for &key in input.keys() {
                routed[key.owner(n)].push(key);
            }
        }

        self.for_each_shard(routed, |shard, keys| shard.insert(&keys))
    }

    fn forward(&self, input: &SparseInput<K>, mut out: ArrayViewMut2<'_, f32>) -> Result<()> {
        self.check_output(input, out.dim())?;

        let n = self.shards.len();
        let v = self.vec_size;
        let params: Vec<_> = self.shards.iter().map(|shard| shard.params().read()).collect();

        for sample in 0..input.batch_size() {
            for slot in 0..self.slots {
                let keys = input.slot_keys(sample, slot);
                let mut dst = out.slice_mut(s![sample, slot * v..(slot + 1) * v]);
                dst.fill(0.);

                for &key in keys {
                    let owner = key.owner(n);
                    if let Some(row) = self.shards[owner].row_of(key) {
                        let src = &params[owner][row * v..(row + 1) * v];
                        dst.iter_mut().zip(src).for_each(|(acc, w)| *acc += w);
                    }
                }

                if !keys.is_empty() {
                    let weight = self.weight(keys.len());
                    dst.mapv_inplace(|x| x * weight);
                }
            }
        }

        Ok(())
    }

    fn backward(
        &self,
        input: &SparseInput<K>,
        d_out: ArrayView2<'_, f32>,
    ) -> Result<SparseGrad<K>> {
        self.check_output(input, d_out.dim())?;

        let v = self.vec_size;
        let mut acc: BTreeMap<K, Vec<f32>> = BTreeMap::new();

        for sample in 0..input.batch_size() {
            for slot in 0..self.slots {
                let keys = input.slot_keys(sample, slot);
                if keys.is_empty() {
                    continue;
                }

                let weight = self.weight(keys.len());
                let d = d_out.slice(s![sample, slot * v..(slot + 1) * v]);

                for &key in keys {
                    let grad = acc.entry(key).or_insert_with(|| vec![0.; v]);
                    grad.iter_mut().zip(d.iter()).for_each(|(g, d)| *g += weight * d);
                }
            }
        }

        let n = self.shards.len();
        let mut routed: Vec<_> = (0..n).map(|_| SparseRows::new(v)).collect();
        for (key, grad) in acc {
            routed[key.owner(n)].push(key, &grad);
        }

        Ok(routed)
    }

    fn update_params(&mut self, grads: Vec<SparseGrad<K>>) -> Result<()> {
        let incoming = self.group.comm().all_to_all(grads)?;
        self.for_each_shard(incoming, |shard, rows| shard.update_params(&rows))?;

        debug!(rows = self.params_num() / self.vec_size; "embedding updated");
        Ok(())
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.shards
            .iter_mut()
            .for_each(|shard| shard.set_learning_rate(learning_rate));
    }

    fn params_num(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum::<usize>() * self.vec_size
    }

    fn grad_buffers(&self) -> Vec<&Buffer<G>> {
        self.shards.iter().map(EmbeddingShard::grads).collect()
    }

    fn grad_buffers_mut(&mut self) -> Vec<&mut Buffer<G>> {
        self.shards.iter_mut().map(EmbeddingShard::grads_mut).collect()
    }

    fn dump(&self) -> Vec<SparseRows<K>> {
        self.shards.iter().map(EmbeddingShard::dump).collect()
    }

    fn load(&mut self, rows: SparseRows<K>) -> Result<()> {
        EngineErr::size_check("embedding vector", rows.vec_size(), self.vec_size)?;

        let n = self.shards.len();
        let mut routed: Vec<_> = (0..n).map(|_| SparseRows::new(self.vec_size)).collect();
        for (key, values) in rows.iter() {
            routed[key.owner(n)].push(key, values);
        }

        self.for_each_shard(routed, |shard, rows| shard.load(&rows))
    }
}
