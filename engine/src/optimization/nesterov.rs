use super::Optimizer;
use crate::{EngineErr, Result, storage::Element};

/// Momentum SGD with Nesterov's look-ahead correction.
#[derive(Debug)]
pub struct Nesterov<G: Element> {
    learning_rate: f32,
    momentum: f32,
    scale: f32,
    accum: Box<[G]>,
}

impl<G: Element> Nesterov<G> {
    /// Creates a new `Nesterov` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - The decay of the accumulated velocity.
    /// * `scale` - The loss scale the gradients arrive multiplied by.
    ///
    /// # Returns
    /// A new `Nesterov` instance.
    pub fn new(len: usize, learning_rate: f32, momentum: f32, scale: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            scale,
            accum: vec![G::default(); len].into_boxed_slice(),
        }
    }
}

impl<G: Element> Optimizer<G> for Nesterov<G> {
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
                let prev = a.widen();
                let acc = mu * prev - lr * g.widen() / s;
                *a = G::narrow(acc);
                *w += -mu * prev + (1. + mu) * acc;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_steps_match_the_look_ahead_update() {
        let (lr, mu) = (0.1, 0.5);
        let mut optimizer = Nesterov::<f32>::new(1, lr, mu, 1.);
        let mut params = [1.];

        optimizer.update_params(&[2.], &mut params).unwrap();
        optimizer.update_params(&[2.], &mut params).unwrap();

        // a1 = -0.2, w1 = 1 + 1.5 * a1
        // a2 = 0.5 * a1 - 0.2, w2 = w1 - 0.5 * a1 + 1.5 * a2
        let a1 = -lr * 2.;
        let a2 = mu * a1 - lr * 2.;
        let expected = 1. + (1. + mu) * a1 - mu * a1 + (1. + mu) * a2;
        assert!((params[0] - expected).abs() < 1e-6);
    }
}
