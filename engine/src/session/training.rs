use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info, warn};
use ndarray::{Array2, s};
use rayon::prelude::*;

use super::{Session, SessionState};
use crate::{
    EngineErr, Result, checkpoint,
    data::{Batch, DataReader},
    device::DeviceGroup,
    embedding::{Embedding, Key, SparseGrad},
    metrics::Metrics,
    network::Network,
    storage::{Buffer, Element},
};

/// A `Session` training one dense replica per device on top of embedding
/// tables shared by the whole group.
///
/// Dense replicas start from the same parameters and are then updated from
/// their own device's batch only. Embedding gradients of every device are
/// routed to the shards owning their keys.
pub struct TrainingSession<K: Key, G: Element> {
    group: Arc<DeviceGroup>,
    networks: Vec<Box<dyn Network<G>>>,
    embeddings: Vec<Box<dyn Embedding<K, G>>>,
    train_reader: DataReader<K>,
    eval_reader: DataReader<K>,
    metrics: Metrics,
    seed: u64,
    state: SessionState,
    loss: Option<f32>,
}

impl<K: Key, G: Element> TrainingSession<K, G> {
    /// Creates a new `TrainingSession`.
    ///
    /// # Arguments
    /// * `group` - The devices the session runs on.
    /// * `networks` - One dense replica per device, in the group's order.
    /// * `embeddings` - The embedding tables, in the order of the batches' sparse inputs.
    /// * `train_reader` - Where the training batches come from.
    /// * `eval_reader` - Where the evaluation batches come from.
    /// * `metrics` - The metrics evaluation feeds.
    /// * `seed` - The seed random dense parameters are drawn from.
    ///
    /// # Returns
    /// A new session or `InvalidArgument` if the replicas don't match the group.
    pub fn new(
        group: Arc<DeviceGroup>,
        networks: Vec<Box<dyn Network<G>>>,
        embeddings: Vec<Box<dyn Embedding<K, G>>>,
        train_reader: DataReader<K>,
        eval_reader: DataReader<K>,
        metrics: Metrics,
        seed: u64,
    ) -> Result<Self> {
        EngineErr::size_check("dense replicas", networks.len(), group.len())?;

        for (network, device) in networks.iter().zip(group.iter()) {
            if network.device().id() != device.id() {
                return Err(EngineErr::InvalidArgument(format!(
                    "replica of device {} given in the place of device {}",
                    network.device().id(),
                    device.id()
                )));
            }
        }

        Ok(Self {
            group,
            networks,
            embeddings,
            train_reader,
            eval_reader,
            metrics,
            seed,
            state: SessionState::Constructed,
            loss: None,
        })
    }

    pub fn networks(&self) -> &[Box<dyn Network<G>>] {
        &self.networks
    }

    pub fn networks_mut(&mut self) -> &mut [Box<dyn Network<G>>] {
        &mut self.networks
    }

    pub fn embeddings(&self) -> &[Box<dyn Embedding<K, G>>] {
        &self.embeddings
    }

    pub fn embeddings_mut(&mut self) -> &mut [Box<dyn Embedding<K, G>>] {
        &mut self.embeddings
    }

    fn check_batches(&self, batches: &[Batch<K>]) -> Result<()> {
        EngineErr::size_check("batches per iteration", batches.len(), self.networks.len())?;
        for batch in batches {
            EngineErr::size_check("batch sparse inputs", batch.sparse.len(), self.embeddings.len())?;
        }

        Ok(())
    }
}

impl<K: Key, G: Element> Session for TrainingSession<K, G> {
    fn start_data_reading(&mut self) -> Result<()> {
        self.train_reader.start()?;
        self.eval_reader.start()?;
        info!(devices = self.group.len(); "data reading started");
        Ok(())
    }

    fn train(&mut self) -> Result<()> {
        let batches = self.train_reader.next()?;
        self.check_batches(&batches)?;
        self.state = SessionState::Training;

        for (table, embedding) in self.embeddings.iter_mut().enumerate() {
            let inputs: Vec<_> = batches.iter().map(|batch| &batch.sparse[table]).collect();
            embedding.prepare(&inputs)?;
        }

        let embeddings = &self.embeddings;
        let replicas: Vec<(f32, Vec<SparseGrad<K>>)> = self
            .networks
            .par_iter_mut()
            .zip(&batches)
            .map(|(network, batch)| {
                let device = Arc::clone(network.device());
                device
                    .stream()
                    .run(|| train_replica(network.as_mut(), embeddings, batch))
            })
            .collect::<Result<_>>()?;

        let mut losses = Vec::with_capacity(replicas.len());
        let mut grads: Vec<Vec<SparseGrad<K>>> = self
            .embeddings
            .iter()
            .map(|_| Vec::with_capacity(replicas.len()))
            .collect();

        for (loss, replica_grads) in replicas {
            losses.push(loss);
            for (table, grad) in grads.iter_mut().zip(replica_grads) {
                table.push(grad);
            }
        }

        for (embedding, grads) in self.embeddings.iter_mut().zip(grads) {
            embedding.update_params(grads)?;
        }

        let loss = losses.iter().sum::<f32>() / losses.len() as f32;
        self.loss = Some(loss);
        debug!(loss = loss; "training iteration done");
        Ok(())
    }

    fn eval(&mut self) -> Result<()> {
        let batches = self.eval_reader.next()?;
        self.check_batches(&batches)?;
        self.state = SessionState::Evaluating;

        let embeddings = &self.embeddings;
        let preds: Vec<Vec<f32>> = self
            .networks
            .par_iter_mut()
            .zip(&batches)
            .map(|(network, batch)| {
                let device = Arc::clone(network.device());
                device.stream().run(|| {
                    let input = assemble_input(embeddings, batch)?;
                    network.predict(input.view())
                })
            })
            .collect::<Result<_>>()?;

        for (preds, batch) in preds.iter().zip(&batches) {
            self.metrics.accumulate(preds, &batch.labels);
        }

        Ok(())
    }

    fn get_eval_metrics(&mut self) -> Vec<(String, f32)> {
        self.metrics.take()
    }

    fn get_current_loss(&self) -> Result<f32> {
        self.loss
            .ok_or(EngineErr::NotReady("no training iteration has run"))
    }

    fn set_learning_rate(&mut self, learning_rate: f32) -> Result<()> {
        if !(learning_rate.is_finite() && learning_rate > 0.) {
            return Err(EngineErr::InvalidArgument(format!(
                "learning rate must be positive and finite, got {learning_rate}"
            )));
        }

        for network in &mut self.networks {
            network.set_learning_rate(learning_rate);
        }
        for embedding in &mut self.embeddings {
            embedding.set_learning_rate(learning_rate);
        }

        debug!(learning_rate = learning_rate; "learning rate changed");
        Ok(())
    }

    fn check_overflow(&self) -> Result<()> {
        self.group.synchronize()?;

        for (i, network) in self.networks.iter().enumerate() {
            if !all_finite(network.grads()) {
                return Err(EngineErr::NumericOverflow {
                    replica: format!("dense replica {i} on device {}", network.device().id()),
                });
            }
        }

        for (table, embedding) in self.embeddings.iter().enumerate() {
            for (shard, grads) in embedding.grad_buffers().into_iter().enumerate() {
                if !all_finite(grads) {
                    return Err(EngineErr::NumericOverflow {
                        replica: format!(
                            "embedding {table} shard {shard} on device {}",
                            grads.device_id()
                        ),
                    });
                }
            }
        }

        Ok(())
    }

    fn download_params_to_files(&self, prefix: &str, iter: usize) -> Result<()> {
        self.group.synchronize()?;

        let mut files = Vec::new();
        if let Some(network) = self.networks.first() {
            let params = network.params().read();
            files.push((
                checkpoint::dense_path(prefix, iter),
                checkpoint::encode_dense(&params),
            ));
        }

        for (table, embedding) in self.embeddings.iter().enumerate() {
            let stem = checkpoint::sparse_stem(prefix, table, iter);
            let parts = embedding.dump();
            for (part, rows) in parts.iter().enumerate() {
                files.push((
                    checkpoint::part_path(&stem, part),
                    checkpoint::encode_part(part, parts.len(), rows),
                ));
            }
        }

        checkpoint::write_atomically(&files)?;
        info!("snapshot of iteration {iter} written to {prefix}*");
        Ok(())
    }

    fn init_params(&mut self, model_file: Option<&Path>) -> Result<()> {
        let Some(first) = self.networks.first() else {
            return Ok(());
        };

        let loaded = match model_file {
            Some(path) => {
                let loaded = checkpoint::read_dense(path, first.params_num())?;
                match loaded {
                    Some(_) => info!("dense parameters loaded from {}", path.display()),
                    None => warn!("{} not found, drawing dense parameters", path.display()),
                }
                loaded
            }
            None => None,
        };

        let values = match loaded {
            Some(values) => values,
            None => first.init_values(self.seed)?,
        };

        let mut targets: Vec<&mut Buffer<f32>> = self
            .networks
            .iter_mut()
            .map(|network| network.params_mut())
            .collect();

        self.group.comm().broadcast(&values, &mut targets)
    }

    fn init_or_load_sparse(&mut self, files: &[PathBuf]) -> Result<()> {
        if files.len() > self.embeddings.len() {
            return Err(EngineErr::InvalidArgument(format!(
                "{} embedding files given for {} tables",
                files.len(),
                self.embeddings.len()
            )));
        }

        for (table, (embedding, stem)) in self.embeddings.iter_mut().zip(files).enumerate() {
            match checkpoint::read_sparse::<K>(stem, embedding.vec_size())? {
                Some(rows) => {
                    let count = rows.len();
                    embedding.load(rows)?;
                    info!(table = table, rows = count; "embedding table loaded");
                }
                None => warn!(
                    "{} not found, table {table} keeps its random rows",
                    stem.display()
                ),
            }
        }

        Ok(())
    }

    fn params_num(&self) -> usize {
        let sparse: usize = self.embeddings.iter().map(|e| e.params_num()).sum();
        let dense = self.networks.first().map_or(0, |n| n.params_num());
        sparse + dense
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

/// Runs the forward and backward passes of one replica and updates its
/// parameters.
///
/// # Returns
/// The replica's loss and the sparse gradient of every table.
fn train_replica<K: Key, G: Element>(
    network: &mut dyn Network<G>,
    embeddings: &[Box<dyn Embedding<K, G>>],
    batch: &Batch<K>,
) -> Result<(f32, Vec<SparseGrad<K>>)> {
    let input = assemble_input(embeddings, batch)?;
    let loss = network.forward(input.view(), &batch.labels)?;
    let d_input = network.backward()?;
    network.update_params()?;

    let mut offset = batch.dense.ncols();
    let grads = embeddings
        .iter()
        .zip(&batch.sparse)
        .map(|(embedding, sparse)| {
            let width = embedding.output_dim();
            let d_out = d_input.slice(s![.., offset..offset + width]);
            offset += width;
            embedding.backward(sparse, d_out)
        })
        .collect::<Result<_>>()?;

    Ok((loss, grads))
}

/// Concatenates a batch's dense features with the output of every table.
fn assemble_input<K: Key, G: Element>(
    embeddings: &[Box<dyn Embedding<K, G>>],
    batch: &Batch<K>,
) -> Result<Array2<f32>> {
    let dense_dim = batch.dense.ncols();
    let width = dense_dim + embeddings.iter().map(|e| e.output_dim()).sum::<usize>();

    let mut input = Array2::zeros((batch.len(), width));
    input.slice_mut(s![.., ..dense_dim]).assign(&batch.dense);

    let mut offset = dense_dim;
    for (embedding, sparse) in embeddings.iter().zip(&batch.sparse) {
        let width = embedding.output_dim();
        embedding.forward(sparse, input.slice_mut(s![.., offset..offset + width]))?;
        offset += width;
    }

    Ok(input)
}

fn all_finite<G: Element>(buffer: &Buffer<G>) -> bool {
    buffer.read().iter().all(|g| g.is_finite())
}
