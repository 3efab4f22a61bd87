use super::Optimizer;
use crate::{EngineErr, Result, storage::Element};

/// Stochastic gradient descent with momentum.
///
/// ```text
/// accum = mu * accum - lr * g / s
/// w     = w + accum
/// ```
///
/// The accumulator is stored with the gradient's element type, so under half
/// precision it is narrowed after every step while the parameters are moved by
/// the un-narrowed value.
#[derive(Debug)]
pub struct MomentumSgd<G: Element> {
    learning_rate: f32,
    momentum: f32,
    scale: f32,
    accum: Box<[G]>,
}

impl<G: Element> MomentumSgd<G> {
    /// Creates a new `MomentumSgd` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - The decay of the accumulated velocity.
    /// * `scale` - The loss scale the gradients arrive multiplied by.
    ///
    /// # Returns
    /// A new `MomentumSgd` instance.
    pub fn new(len: usize, learning_rate: f32, momentum: f32, scale: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            scale,
            accum: vec![G::default(); len].into_boxed_slice(),
        }
    }

    pub fn accum(&self) -> &[G] {
        &self.accum
    }
}

impl<G: Element> Optimizer<G> for MomentumSgd<G> {
    fn update_params(&mut self, grad: &[G], params: &mut [f32]) -> Result<()> {
        EngineErr::size_check("gradient", grad.len(), params.len())?;
        EngineErr::size_check("momentum accumulator", self.accum.len(), params.len())?;

        let Self {
            learning_rate: lr,
            momentum: mu,
            scale: s,
            ..
        } = *self;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.accum.iter_mut())
            .for_each(|((w, g), a)| {
                let acc = mu * a.widen() - lr * g.widen() / s;
                *a = G::narrow(acc);
                *w += acc;
            });

        Ok(())
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
