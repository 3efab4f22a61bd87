use crate::{Result, storage::Element};

/// Defines the strategy for updating parameters based on calculated gradients.
///
/// The gradients an optimizer receives are multiplied by a loss scale fixed at
/// construction, every implementation divides it back out.
pub trait Optimizer<G: Element>: Send + Sync {
    /// Updates the provided slice of parameters using the gradient.
    ///
    /// # Arguments
    /// * `grad` - The scaled gradient of the parameters.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad`, `params` and the optimizer's state.
    fn update_params(&mut self, grad: &[G], params: &mut [f32]) -> Result<()>;

    /// Replaces the learning rate used by every following update.
    fn set_learning_rate(&mut self, learning_rate: f32);

    fn learning_rate(&self) -> f32;
}
