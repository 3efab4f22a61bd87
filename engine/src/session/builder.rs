use std::sync::Arc;

use half::f16;
use log::info;
use specs::{KeyTypeSpec, OptimizerSpec, PrecisionSpec, SessionSpec};

use super::{Session, TrainingSession};
use crate::{
    EngineErr, Result,
    data::{BatchShape, DataReader},
    device::DeviceGroup,
    embedding::{DistributedEmbedding, Embedding, Key},
    metrics::Metrics,
    network::{DenseNetwork, Network},
    storage::Element,
};

/// Builds `Session`s given a specification.
///
/// The key type and the gradient precision are only known at runtime, each
/// `resolve_*` step fixes one of them as a generic parameter so that the
/// session itself is fully monomorphized.
#[derive(Debug, Default)]
pub struct SessionBuilder;

impl SessionBuilder {
    /// Creates a new `SessionBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new `Session` following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification of the session.
    ///
    /// # Returns
    /// A new session, `InvalidArgument` if the specification is inconsistent
    /// or `OutOfMemory` if the parameters don't fit the devices.
    pub fn build(&self, spec: &SessionSpec) -> Result<Box<dyn Session>> {
        self.validate(spec)?;
        self.resolve_key_type(spec)
    }

    fn validate(&self, spec: &SessionSpec) -> Result<()> {
        let invalid = |detail: String| Err(EngineErr::InvalidArgument(detail));

        if spec.devices.is_empty() {
            return invalid("a session needs at least one device".into());
        }

        let lr = spec.optimizer.learning_rate();
        if !(lr.is_finite() && lr > 0.) {
            return invalid(format!("learning rate must be positive and finite, got {lr}"));
        }

        if let Some(momentum) = spec.optimizer.momentum()
            && !(0. ..1.).contains(&momentum)
        {
            return invalid(format!("momentum must be in [0, 1), got {momentum}"));
        }

        if let OptimizerSpec::Adam { beta1, beta2, .. } = spec.optimizer
            && !((0. ..1.).contains(&beta1) && (0. ..1.).contains(&beta2))
        {
            return invalid(format!("adam betas must be in [0, 1), got {beta1} and {beta2}"));
        }

        if let PrecisionSpec::Mixed { loss_scale } = spec.precision
            && !is_power_of_two(loss_scale)
        {
            return invalid(format!(
                "loss scale must be a power of two not below 1, got {loss_scale}"
            ));
        }

        if spec.network.dense_dim == 0 && spec.embeddings.is_empty() {
            return invalid("the network has no input".into());
        }

        Ok(())
    }

    /// Resolves the key type of the embedding tables and data.
    fn resolve_key_type(&self, spec: &SessionSpec) -> Result<Box<dyn Session>> {
        match spec.key_type {
            KeyTypeSpec::U32 => self.resolve_precision::<u32>(spec),
            KeyTypeSpec::I64 => self.resolve_precision::<i64>(spec),
        }
    }

    /// Resolves the element type gradients and optimizer state are kept in.
    fn resolve_precision<K: Key>(&self, spec: &SessionSpec) -> Result<Box<dyn Session>> {
        match spec.precision {
            PrecisionSpec::Full => self.terminate_build::<K, f32>(spec, 1.),
            PrecisionSpec::Mixed { loss_scale } => {
                self.terminate_build::<K, f16>(spec, loss_scale)
            }
        }
    }

    /// Terminates the entire build for this session and finally instanciates all the entities.
    fn terminate_build<K: Key, G: Element>(
        &self,
        spec: &SessionSpec,
        loss_scale: f32,
    ) -> Result<Box<dyn Session>> {
        let group = Arc::new(DeviceGroup::new(&spec.devices)?);

        let embeddings = spec
            .embeddings
            .iter()
            .enumerate()
            .map(|(table, embedding)| {
                let seed = spec.seed.wrapping_add(table as u64);
                let embedding = DistributedEmbedding::<K, G>::new(
                    &group,
                    embedding,
                    &spec.optimizer,
                    loss_scale,
                    seed,
                )?;
                Ok(Box::new(embedding) as Box<dyn Embedding<K, G>>)
            })
            .collect::<Result<Vec<_>>>()?;

        let input_dim = spec.network.dense_dim
            + embeddings.iter().map(|e| e.output_dim()).sum::<usize>();

        let networks = group
            .iter()
            .map(|device| {
                let network = DenseNetwork::<G>::new(
                    Arc::clone(device),
                    &spec.network,
                    input_dim,
                    &spec.optimizer,
                    loss_scale,
                )?;
                Ok(Box::new(network) as Box<dyn Network<G>>)
            })
            .collect::<Result<Vec<_>>>()?;

        let shape = BatchShape {
            batch_size: spec.batch_size.get(),
            dense_dim: spec.network.dense_dim,
            slots: spec.embeddings.iter().map(|e| e.slots).collect(),
        };
        let train_reader = DataReader::from_spec(&spec.train_data, group.len(), shape.clone())?;
        let eval_reader = DataReader::from_spec(&spec.eval_data, group.len(), shape)?;

        let session = TrainingSession::new(
            Arc::clone(&group),
            networks,
            embeddings,
            train_reader,
            eval_reader,
            Metrics::from_spec(&spec.metrics),
            spec.seed,
        )?;

        info!(
            devices = group.len(),
            tables = spec.embeddings.len(),
            input_dim = input_dim,
            loss_scale = loss_scale;
            "session built"
        );

        Ok(Box::new(session))
    }
}

fn is_power_of_two(scale: f32) -> bool {
    const MANTISSA: u32 = 0x007f_ffff;
    scale.is_finite() && scale >= 1. && scale.to_bits() & MANTISSA == 0
}
