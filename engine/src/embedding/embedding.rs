use ndarray::{ArrayView2, ArrayViewMut2};

use super::{Key, SparseRows};
use crate::{Result, data::SparseInput, storage::Buffer, storage::Element};

/// The gradient a device produced for one table, split by destination shard.
pub type SparseGrad<K> = Vec<SparseRows<K>>;

/// A sparse embedding table spread over the devices of a group.
///
/// An iteration drives it through `prepare`, then one `forward` and one
/// `backward` per device (possibly in parallel), then a single `update_params`
/// with every device's gradient.
pub trait Embedding<K: Key, G: Element>: Send + Sync {
    fn slots(&self) -> usize;

    fn vec_size(&self) -> usize;

    /// The width of the output rows, one vector per slot.
    fn output_dim(&self) -> usize {
        self.slots() * self.vec_size()
    }

    /// Makes room for every key in `inputs` that the table doesn't hold yet.
    ///
    /// # Arguments
    /// * `inputs` - The sparse input of every device for this iteration.
    ///
    /// # Returns
    /// `OutOfMemory` if a shard runs out of rows.
    fn prepare(&mut self, inputs: &[&SparseInput<K>]) -> Result<()>;

    /// Looks up and combines the vectors of every slot of every sample.
    ///
    /// # Arguments
    /// * `input` - A device's sparse input.
    /// * `out` - Where to write the `[batch, output_dim]` result.
    fn forward(&self, input: &SparseInput<K>, out: ArrayViewMut2<'_, f32>) -> Result<()>;

    /// Computes the gradient of every key looked up by `forward`.
    ///
    /// # Arguments
    /// * `input` - The same sparse input given to `forward`.
    /// * `d_out` - The gradient of the loss with respect to the output.
    ///
    /// # Returns
    /// The gradient rows, already routed to the shard owning each key.
    fn backward(&self, input: &SparseInput<K>, d_out: ArrayView2<'_, f32>)
    -> Result<SparseGrad<K>>;

    /// Exchanges the devices' gradients and lets every shard's optimizer apply them.
    ///
    /// # Arguments
    /// * `grads` - The output of `backward` for every device, in replica order.
    fn update_params(&mut self, grads: Vec<SparseGrad<K>>) -> Result<()>;

    fn set_learning_rate(&mut self, learning_rate: f32);

    /// The amount of parameters currently in use.
    fn params_num(&self) -> usize;

    fn grad_buffers(&self) -> Vec<&Buffer<G>>;

    fn grad_buffers_mut(&mut self) -> Vec<&mut Buffer<G>>;

    /// Copies out the rows of every shard, one entry per shard.
    fn dump(&self) -> Vec<SparseRows<K>>;

    /// Inserts or overwrites `rows`, each going to the shard that owns it.
    fn load(&mut self, rows: SparseRows<K>) -> Result<()>;
}
