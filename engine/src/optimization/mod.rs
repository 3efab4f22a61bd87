mod adam;
mod gradient_descent;
mod momentum_sgd;
mod nesterov;
mod optimizer;

pub use adam::Adam;
pub use gradient_descent::GradientDescent;
pub use momentum_sgd::MomentumSgd;
pub use nesterov::Nesterov;
pub use optimizer::Optimizer;

use specs::OptimizerSpec;

use crate::storage::Element;

/// Builds the optimizer described by `spec`.
///
/// # Arguments
/// * `spec` - The optimizer's specification.
/// * `len` - The amount of parameters the optimizer will update.
/// * `loss_scale` - The factor the gradients it receives are scaled by.
///
/// # Returns
/// A boxed optimizer for gradients of element type `G`.
pub fn build<G: Element>(spec: &OptimizerSpec, len: usize, loss_scale: f32) -> Box<dyn Optimizer<G>> {
    match *spec {
        OptimizerSpec::Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon, loss_scale)),
        OptimizerSpec::GradientDescent { learning_rate } => {
            Box::new(GradientDescent::new(learning_rate, loss_scale))
        }
        OptimizerSpec::MomentumSgd {
            learning_rate,
            momentum,
        } => Box::new(MomentumSgd::<G>::new(len, learning_rate, momentum, loss_scale)),
        OptimizerSpec::Nesterov {
            learning_rate,
            momentum,
        } => Box::new(Nesterov::<G>::new(len, learning_rate, momentum, loss_scale)),
    }
}
