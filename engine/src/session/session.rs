use std::path::{Path, PathBuf};

use crate::Result;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built, no iteration has run yet.
    Constructed,
    /// The last iteration was a training one.
    Training,
    /// The last iteration was an evaluation one.
    Evaluating,
}

/// A multi device training session.
///
/// Owns the dense replicas, the embedding tables, both data readers and the
/// evaluation metrics. Once built only its learning rate can be changed.
pub trait Session: Send {
    /// Starts prefetching both the training and the evaluation data.
    fn start_data_reading(&mut self) -> Result<()>;

    /// Runs a single training iteration over one batch per device.
    ///
    /// # Returns
    /// `NotReady` if data reading hasn't started, `EndOfData` if the training
    /// data is exhausted and configured to end, `DeviceFault` if a device failed.
    fn train(&mut self) -> Result<()>;

    /// Runs a forward pass over one evaluation batch per device and feeds the metrics.
    fn eval(&mut self) -> Result<()>;

    /// Finalizes the metrics accumulated since the last call and resets them.
    fn get_eval_metrics(&mut self) -> Vec<(String, f32)>;

    /// The mean training loss over every device of the last iteration.
    fn get_current_loss(&self) -> Result<f32>;

    /// Changes the learning rate of every optimizer, effective from the next `train`.
    fn set_learning_rate(&mut self, learning_rate: f32) -> Result<()>;

    /// Looks for non finite values in every gradient buffer.
    ///
    /// # Returns
    /// `NumericOverflow` naming the first replica holding one.
    fn check_overflow(&self) -> Result<()>;

    /// Writes a snapshot of every parameter.
    ///
    /// # Arguments
    /// * `prefix` - The path prefix of every file.
    /// * `iter` - The iteration the snapshot is tagged with.
    fn download_params_to_files(&self, prefix: &str, iter: usize) -> Result<()>;

    /// Loads the dense parameters from `model_file` or draws them at random,
    /// then copies them to every replica.
    ///
    /// # Returns
    /// `CorruptFile` if the file exists but doesn't fit the network.
    fn init_params(&mut self, model_file: Option<&Path>) -> Result<()>;

    /// Loads every embedding table `i` from the snapshot named by `files[i]`,
    /// tables without one keep their lazy random initialization.
    fn init_or_load_sparse(&mut self, files: &[PathBuf]) -> Result<()>;

    /// The embedding parameters in use plus the parameters of one dense replica.
    fn params_num(&self) -> usize;

    fn state(&self) -> SessionState;
}
