use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::{DataSpec, DistributionSpec, OptimizerSpec, WeightInitSpec};

/// A simulated accelerator taking part in training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: usize,
    /// The memory budget of the device in bytes.
    pub memory_limit: usize,
}

/// The width of the keys fed to the embedding tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTypeSpec {
    U32,
    #[default]
    I64,
}

/// The element type of the gradient buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionSpec {
    #[default]
    Full,
    /// Half precision gradients, scaled up by `loss_scale` during backward
    /// and scaled back down inside the optimizers.
    Mixed { loss_scale: f32 },
}

impl PrecisionSpec {
    pub fn loss_scale(&self) -> f32 {
        match *self {
            Self::Full => 1.0,
            Self::Mixed { loss_scale } => loss_scale,
        }
    }
}

/// How the vectors of the keys in a single slot are reduced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinerSpec {
    #[default]
    Sum,
    Mean,
}

/// The specification for a single embedding table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSpec {
    pub slots: usize,
    pub vec_size: usize,
    /// The maximum amount of keys each device's shard can hold.
    pub max_vocabulary_per_device: usize,
    #[serde(default)]
    pub combiner: CombinerSpec,
    #[serde(default = "default_embedding_init")]
    pub init: DistributionSpec,
}

fn default_embedding_init() -> DistributionSpec {
    DistributionSpec::Uniform {
        low: -0.05,
        high: 0.05,
    }
}

/// The specification for the dense network replicated on every device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub dense_dim: usize,
    /// The widths of the hidden layers, the output layer is always a single logit.
    pub hidden: Vec<usize>,
    #[serde(default)]
    pub weight_init: WeightInitSpec,
}

/// The evaluation metrics to accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSpec {
    Auc,
    AverageLoss,
}

fn default_metrics() -> Vec<MetricSpec> {
    vec![MetricSpec::Auc]
}

/// The specification for the `Session` trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub key_type: KeyTypeSpec,
    #[serde(default)]
    pub precision: PrecisionSpec,
    pub optimizer: OptimizerSpec,
    pub network: NetworkSpec,
    pub embeddings: Vec<EmbeddingSpec>,
    /// The amount of samples each device processes per iteration.
    pub batch_size: NonZeroUsize,
    pub train_data: DataSpec,
    pub eval_data: DataSpec,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub seed: u64,
}
