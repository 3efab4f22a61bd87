use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::SessionSpec;

/// The specification for a whole training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSpec {
    pub session: SessionSpec,
    pub max_iter: usize,
    /// Log the training loss every `display` iterations, 0 disables it.
    #[serde(default)]
    pub display: usize,
    #[serde(default)]
    pub eval_interval: usize,
    #[serde(default = "default_eval_batches")]
    pub eval_batches: usize,
    #[serde(default)]
    pub snapshot: usize,
    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,
    #[serde(default)]
    pub model_file: Option<PathBuf>,
    #[serde(default)]
    pub embedding_files: Vec<PathBuf>,
    /// Overrides the optimizer's learning rate once the session is built.
    #[serde(default)]
    pub learning_rate: Option<f32>,
    #[serde(default)]
    pub overflow_check: bool,
}

fn default_eval_batches() -> usize {
    1
}

fn default_snapshot_prefix() -> String {
    "snapshot".to_string()
}
