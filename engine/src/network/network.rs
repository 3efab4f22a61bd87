use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use crate::{
    Result,
    device::Device,
    storage::{Buffer, Element},
};

/// A dense network replica bound to a single device.
///
/// Its input is the concatenation of a batch's dense features and the outputs
/// of every embedding table, its output is one click probability per sample.
pub trait Network<G: Element>: Send {
    fn device(&self) -> &Arc<Device>;

    fn input_dim(&self) -> usize;

    /// Runs the training forward pass and keeps what `backward` needs.
    ///
    /// # Arguments
    /// * `input` - The `[batch, input_dim]` input.
    /// * `labels` - One label per sample.
    ///
    /// # Returns
    /// The mean loss of the batch.
    fn forward(&mut self, input: ArrayView2<'_, f32>, labels: &[f32]) -> Result<f32>;

    /// Writes the loss scaled gradients of the last `forward` into the gradient buffer.
    ///
    /// # Returns
    /// The loss scaled gradient with respect to the input.
    fn backward(&mut self) -> Result<Array2<f32>>;

    /// Runs a forward pass that leaves the training state alone.
    ///
    /// # Returns
    /// One probability per sample.
    fn predict(&mut self, input: ArrayView2<'_, f32>) -> Result<Vec<f32>>;

    /// Applies the gradient buffer to the parameters through the optimizer.
    fn update_params(&mut self) -> Result<()>;

    fn set_learning_rate(&mut self, learning_rate: f32);

    fn params_num(&self) -> usize;

    /// Draws fresh initial parameters for this architecture.
    fn init_values(&self, seed: u64) -> Result<Vec<f32>>;

    fn params(&self) -> &Buffer<f32>;

    fn params_mut(&mut self) -> &mut Buffer<f32>;

    fn grads(&self) -> &Buffer<G>;

    fn grads_mut(&mut self) -> &mut Buffer<G>;
}
