use serde::{Deserialize, Serialize};

/// The specification for the `Distribution` trait.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionSpec {
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
    XavierUniform { fan_in: usize, fan_out: usize },
    Xavier { fan_in: usize, fan_out: usize },
    Kaiming { fan_in: usize },
    Lecun { fan_in: usize },
    LecunUniform { fan_in: usize },
}

/// The specification for the `ParamGen` trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGenSpec {
    Const {
        value: f32,
        limit: usize,
    },
    Rand {
        distribution: DistributionSpec,
        limit: usize,
    },
    Chained {
        specs: Vec<ParamGenSpec>,
    },
}

/// How the weights of each dense layer are drawn.
///
/// The fan values are only known once the layer shapes are, so they are
/// filled in per layer by `distribution`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInitSpec {
    #[default]
    XavierUniform,
    Xavier,
    Kaiming,
    Lecun,
    LecunUniform,
}

impl WeightInitSpec {
    /// Resolves this scheme into a concrete distribution for a layer.
    ///
    /// # Arguments
    /// * `fan_in` - The amount of inputs of the layer.
    /// * `fan_out` - The amount of outputs of the layer.
    ///
    /// # Returns
    /// The distribution to sample the layer's weights from.
    pub fn distribution(self, fan_in: usize, fan_out: usize) -> DistributionSpec {
        match self {
            Self::XavierUniform => DistributionSpec::XavierUniform { fan_in, fan_out },
            Self::Xavier => DistributionSpec::Xavier { fan_in, fan_out },
            Self::Kaiming => DistributionSpec::Kaiming { fan_in },
            Self::Lecun => DistributionSpec::Lecun { fan_in },
            Self::LecunUniform => DistributionSpec::LecunUniform { fan_in },
        }
    }
}
