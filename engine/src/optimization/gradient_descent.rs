use super::Optimizer;
use crate::{EngineErr, Result, storage::Element};

#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f32,
    scale: f32,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `scale` - The loss scale the gradients arrive multiplied by.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f32, scale: f32) -> Self {
        Self {
            learning_rate,
            scale,
        }
    }
}

impl<G: Element> Optimizer<G> for GradientDescent {
    fn update_params(&mut self, grad: &[G], params: &mut [f32]) -> Result<()> {
        EngineErr::size_check("gradient", grad.len(), params.len())?;

        let Self {
            learning_rate: lr,
            scale: s,
        } = *self;

        params
            .iter_mut()
            .zip(grad)
            .for_each(|(w, g)| *w -= lr * g.widen() / s);

        Ok(())
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use half::f16;

    use super::*;

    #[test]
    fn scaled_half_gradients_are_unscaled() {
        let mut optimizer = GradientDescent::new(0.5, 256.);
        let grad = [f16::from_f32(256.), f16::from_f32(-512.)];
        let mut params = [1., 1.];

        optimizer.update_params(&grad, &mut params).unwrap();

        assert_eq!(params, [0.5, 2.]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut optimizer = GradientDescent::new(0.1, 1.);

        let err = Optimizer::<f32>::update_params(&mut optimizer, &[1., 2.], &mut [0.]);

        assert!(matches!(err, Err(EngineErr::SizeMismatch { .. })));
    }
}
