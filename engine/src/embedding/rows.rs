use super::Key;

/// A set of embedding rows, each a key paired with its vector.
///
/// Used both for the sparse gradients routed between devices and for the
/// contents of a shard when it is saved or restored.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseRows<K> {
    vec_size: usize,
    keys: Vec<K>,
    values: Vec<f32>,
}

impl<K: Key> SparseRows<K> {
    pub fn new(vec_size: usize) -> Self {
        Self::with_capacity(vec_size, 0)
    }

    pub fn with_capacity(vec_size: usize, rows: usize) -> Self {
        Self {
            vec_size,
            keys: Vec::with_capacity(rows),
            values: Vec::with_capacity(rows * vec_size),
        }
    }

    /// Appends a row, `values` must be `vec_size` long.
    pub fn push(&mut self, key: K, values: &[f32]) {
        debug_assert_eq!(values.len(), self.vec_size);
        self.keys.push(key);
        self.values.extend_from_slice(values);
    }

    pub fn vec_size(&self) -> usize {
        self.vec_size
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &[f32])> {
        self.keys
            .iter()
            .copied()
            .zip(self.values.chunks_exact(self.vec_size.max(1)))
    }

    /// Moves every row of `other` to the end of `self`.
    pub fn append(&mut self, other: &mut Self) {
        self.keys.append(&mut other.keys);
        self.values.append(&mut other.values);
    }
}
