use serde::{Deserialize, Serialize};

/// The specification for the `Optimizer` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    MomentumSgd {
        learning_rate: f32,
        momentum: f32,
    },
    Nesterov {
        learning_rate: f32,
        momentum: f32,
    },
}

impl OptimizerSpec {
    /// The learning rate the optimizer starts with.
    pub fn learning_rate(&self) -> f32 {
        match *self {
            Self::Adam { learning_rate, .. }
            | Self::GradientDescent { learning_rate }
            | Self::MomentumSgd { learning_rate, .. }
            | Self::Nesterov { learning_rate, .. } => learning_rate,
        }
    }

    /// The momentum factor, for the optimizers that carry one.
    pub fn momentum(&self) -> Option<f32> {
        match *self {
            Self::MomentumSgd { momentum, .. } | Self::Nesterov { momentum, .. } => Some(momentum),
            _ => None,
        }
    }
}
