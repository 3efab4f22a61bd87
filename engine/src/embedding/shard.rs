use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    mem,
    rc::Rc,
    sync::Arc,
};

use rand::{SeedableRng, rngs::StdRng};

use super::{Key, SparseRows, mix};
use crate::{
    EngineErr, Result,
    device::Device,
    initialization::{Dist, ParamGen, RandParamGen},
    optimization::Optimizer,
    storage::{Buffer, Element},
};

/// The part of an embedding table held by a single device.
///
/// Rows are handed out in insertion order from fixed size buffers, the shard
/// never grows past the capacity it was built with.
pub struct EmbeddingShard<K: Key, G: Element> {
    device: Arc<Device>,
    vec_size: usize,
    capacity: usize,
    rows: HashMap<K, usize>,
    keys: Vec<K>,
    params: Buffer<f32>,
    grads: Buffer<G>,
    optimizer: Box<dyn Optimizer<G>>,
    dist: Dist,
    seed: u64,
}

impl<K: Key, G: Element> EmbeddingShard<K, G> {
    /// Creates a new `EmbeddingShard`.
    ///
    /// # Arguments
    /// * `device` - The device the shard lives on.
    /// * `vec_size` - The length of every row.
    /// * `capacity` - The maximum amount of rows.
    /// * `optimizer` - The optimizer for `capacity * vec_size` parameters.
    /// * `dist` - The distribution new rows are drawn from.
    /// * `seed` - The table's seed, mixed with the key for every new row.
    ///
    /// # Returns
    /// A new `EmbeddingShard` or `OutOfMemory` if its buffers don't fit the device.
    pub fn new(
        device: Arc<Device>,
        vec_size: usize,
        capacity: usize,
        optimizer: Box<dyn Optimizer<G>>,
        dist: Dist,
        seed: u64,
    ) -> Result<Self> {
        let len = capacity * vec_size;

        Ok(Self {
            params: Buffer::new(Arc::clone(&device), len)?,
            grads: Buffer::new(Arc::clone(&device), len)?,
            device,
            vec_size,
            capacity,
            rows: HashMap::with_capacity(capacity),
            keys: Vec::with_capacity(capacity),
            optimizer,
            dist,
            seed,
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The amount of rows in use.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn row_of(&self, key: K) -> Option<usize> {
        self.rows.get(&key).copied()
    }

    pub fn params(&self) -> &Buffer<f32> {
        &self.params
    }

    pub fn grads(&self) -> &Buffer<G> {
        &self.grads
    }

    pub fn grads_mut(&mut self) -> &mut Buffer<G> {
        &mut self.grads
    }

    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.optimizer.set_learning_rate(learning_rate);
    }

    /// Gives every key in `keys` that isn't held yet a freshly initialized row.
    ///
    /// A row's initial values only depend on the table seed and the key.
    pub fn insert(&mut self, keys: &[K]) -> Result<()> {
        let mut fresh = Vec::new();
        let mut outcome = Ok(());

        for &key in keys {
            if self.rows.contains_key(&key) {
                continue;
            }

            match self.next_row(key) {
                Ok(row) => fresh.push((row, key)),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        let v = self.vec_size;
        let mut params = self.params.write();

        for (row, key) in fresh {
            let rng = StdRng::seed_from_u64(self.seed ^ mix(key.to_bits()));
            RandParamGen::new(Rc::new(RefCell::new(rng)), self.dist, v)
                .fill(&mut params[row * v..(row + 1) * v])?;
        }

        outcome
    }

    /// Writes `rows` into the shard, overwriting the keys it already holds.
    ///
    /// # Returns
    /// `OutOfMemory`, leaving the shard untouched, if the new keys don't fit.
    pub fn load(&mut self, rows: &SparseRows<K>) -> Result<()> {
        EngineErr::size_check("embedding vector", rows.vec_size(), self.vec_size)?;

        let mut seen = HashSet::new();
        let fresh: Vec<K> = rows
            .keys()
            .iter()
            .copied()
            .filter(|key| !self.rows.contains_key(key) && seen.insert(*key))
            .collect();

        let free = self.capacity - self.keys.len();
        if fresh.len() > free {
            let row_bytes = self.vec_size * mem::size_of::<f32>();
            return Err(EngineErr::OutOfMemory {
                device: self.device.id(),
                requested: fresh.len() * row_bytes,
                available: free * row_bytes,
            });
        }

        for key in fresh {
            self.next_row(key)?;
        }

        let v = self.vec_size;
        let mut params = self.params.write();

        for (key, values) in rows.iter() {
            let row = self.rows[&key];
            params[row * v..(row + 1) * v].copy_from_slice(values);
        }

        Ok(())
    }

    fn next_row(&mut self, key: K) -> Result<usize> {
        let row = self.keys.len();
        if row == self.capacity {
            return Err(EngineErr::OutOfMemory {
                device: self.device.id(),
                requested: self.vec_size * mem::size_of::<f32>(),
                available: 0,
            });
        }

        self.rows.insert(key, row);
        self.keys.push(key);
        Ok(row)
    }

    /// Sums the incoming gradient rows into the gradient buffer, then runs the
    /// optimizer over the whole shard.
    ///
    /// # Arguments
    /// * `incoming` - The gradient rows sent by every device, in replica order.
    ///
    /// # Returns
    /// `InvalidArgument` if a row names a key the shard doesn't hold.
    pub fn update_params(&mut self, incoming: &[SparseRows<K>]) -> Result<()> {
        let v = self.vec_size;

        {
            let mut grads = self.grads.write();
            grads.fill(G::default());

            for (key, values) in incoming.iter().flat_map(SparseRows::iter) {
                let Some(&row) = self.rows.get(&key) else {
                    return Err(EngineErr::InvalidArgument(format!(
                        "shard on device {} got a gradient for unknown key {key:?}",
                        self.device.id()
                    )));
                };

                grads[row * v..(row + 1) * v]
                    .iter_mut()
                    .zip(values)
                    .for_each(|(acc, g)| *acc = G::narrow(acc.widen() + g));
            }
        }

        self.optimizer
            .update_params(&self.grads.read(), &mut self.params.write())
    }

    /// Copies out every row in use, in insertion order.
    pub fn dump(&self) -> SparseRows<K> {
        let v = self.vec_size;
        let params = self.params.read();

        let mut rows = SparseRows::with_capacity(v, self.keys.len());
        for (row, &key) in self.keys.iter().enumerate() {
            rows.push(key, &params[row * v..(row + 1) * v]);
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use specs::DistributionSpec;

    use super::*;
    use crate::optimization::GradientDescent;

    fn shard(capacity: usize) -> EmbeddingShard<u32, f32> {
        let device = Arc::new(Device::new(0, 1 << 16).unwrap());
        let dist = Dist::new(&DistributionSpec::Uniform { low: -0.1, high: 0.1 }).unwrap();
        EmbeddingShard::new(
            device,
            2,
            capacity,
            Box::new(GradientDescent::new(1., 1.)),
            dist,
            11,
        )
        .unwrap()
    }

    #[test]
    fn inserting_a_known_key_is_a_no_op() {
        let mut shard = shard(4);

        shard.insert(&[5, 9, 5]).unwrap();
        let before = shard.dump();
        shard.insert(&[9]).unwrap();

        assert_eq!(shard.len(), 2);
        assert_eq!(shard.dump(), before);
        assert_eq!(shard.row_of(9), Some(1));
    }

    #[test]
    fn row_init_only_depends_on_the_key() {
        let mut a = shard(4);
        let mut b = shard(4);

        a.insert(&[1, 2]).unwrap();
        b.insert(&[2, 1]).unwrap();

        let a: HashMap<_, _> = a.dump().iter().map(|(k, v)| (k, v.to_vec())).collect();
        let b: HashMap<_, _> = b.dump().iter().map(|(k, v)| (k, v.to_vec())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut shard = shard(2);

        let err = shard.insert(&[1, 2, 3]).unwrap_err();

        assert!(matches!(err, EngineErr::OutOfMemory { .. }));
    }

    #[test]
    fn an_oversized_load_leaves_the_shard_untouched() {
        let mut shard = shard(2);
        shard.insert(&[1]).unwrap();
        let before = shard.dump();

        let mut rows = SparseRows::new(2);
        rows.push(1, &[0.5, 0.5]);
        rows.push(2, &[0.5, 0.5]);
        rows.push(3, &[0.5, 0.5]);
        let err = shard.load(&rows).unwrap_err();

        assert!(matches!(err, EngineErr::OutOfMemory { .. }));
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.row_of(2), None);
        assert_eq!(shard.dump(), before);
    }

    #[test]
    fn loading_repeated_keys_uses_one_row() {
        let mut shard = shard(2);
        let mut rows = SparseRows::new(2);
        rows.push(4, &[0.25, 0.25]);
        rows.push(5, &[0.5, 0.5]);
        rows.push(4, &[1., 1.]);

        shard.load(&rows).unwrap();

        assert_eq!(shard.len(), 2);
        assert_eq!(shard.dump().iter().next(), Some((4, &[1f32, 1.][..])));
    }

    #[test]
    fn gradients_from_every_device_are_summed() {
        let mut shard = shard(2);
        let mut rows = SparseRows::new(2);
        rows.push(7, &[0.25, 0.5]);
        shard.load(&rows).unwrap();

        let mut from_a = SparseRows::new(2);
        from_a.push(7, &[0.5, 0.5]);
        let mut from_b = SparseRows::new(2);
        from_b.push(7, &[0.25, -0.25]);
        shard.update_params(&[from_a, from_b]).unwrap();

        let dumped = shard.dump();
        assert_eq!(dumped.iter().next(), Some((7, &[-0.5f32, 0.25][..])));
    }

    #[test]
    fn gradients_for_unknown_keys_are_rejected() {
        let mut shard = shard(2);
        let mut rows = SparseRows::new(2);
        rows.push(3, &[1., 1.]);

        assert!(shard.update_params(&[rows]).is_err());
    }
}
