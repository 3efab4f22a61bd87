use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// What a data reader does once its source runs dry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionSpec {
    /// Rewind the source and keep streaming.
    #[default]
    Loop,
    /// Stop streaming, pulling another batch fails.
    End,
}

/// A single labeled sample given inline in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub label: f32,
    #[serde(default)]
    pub dense: Vec<f32>,
    /// The keys of the sample, indexed by table, then slot.
    pub keys: Vec<Vec<Vec<i64>>>,
}

/// Where the samples come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSpec {
    /// A seeded simulator producing random samples.
    Synthetic {
        samples: usize,
        key_range: u64,
        nnz_per_slot: usize,
        seed: u64,
    },
    Inline {
        samples: Vec<SampleSpec>,
    },
}

fn default_prefetch() -> NonZeroUsize {
    NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN)
}

/// The specification for a `DataReader`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSpec {
    pub source: SourceSpec,
    #[serde(default)]
    pub exhaustion: ExhaustionSpec,
    /// The amount of iterations buffered ahead of the consumer.
    #[serde(default = "default_prefetch")]
    pub prefetch: NonZeroUsize,
}
