#![allow(dead_code)]

use std::sync::Arc;

use engine::{
    EngineErr, Result,
    data::{BatchShape, DataReader, InMemorySource, Sample},
    device::{Device, DeviceGroup},
    embedding::{DistributedEmbedding, Embedding, Key},
    metrics::Metrics,
    network::Network,
    optimization::{self, Optimizer},
    session::TrainingSession,
    storage::{Buffer, Element},
};
use ndarray::{Array2, ArrayView2};
use specs::{CombinerSpec, DeviceSpec, DistributionSpec, EmbeddingSpec, ExhaustionSpec, OptimizerSpec};

/// A deterministic gradient, a function of the step and element index only.
pub fn synthetic_grad(step: usize, i: usize) -> f32 {
    ((i * 7 + step * 13) % 17) as f32 / 17. - 0.5
}

/// A `Network` whose gradients are `synthetic_grad` instead of coming from a loss.
pub struct ScriptedNetwork<G: Element> {
    device: Arc<Device>,
    input_dim: usize,
    params: Buffer<f32>,
    grads: Buffer<G>,
    optimizer: Box<dyn Optimizer<G>>,
    loss_scale: f32,
    step: usize,
    rows: usize,
    panics: bool,
}

impl<G: Element> ScriptedNetwork<G> {
    pub fn new(
        device: Arc<Device>,
        len: usize,
        input_dim: usize,
        optimizer: &OptimizerSpec,
        loss_scale: f32,
    ) -> Self {
        Self {
            params: Buffer::new(Arc::clone(&device), len).unwrap(),
            grads: Buffer::new(Arc::clone(&device), len).unwrap(),
            device,
            input_dim,
            optimizer: optimization::build::<G>(optimizer, len, loss_scale),
            loss_scale,
            step: 0,
            rows: 0,
            panics: false,
        }
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }
}

impl<G: Element> Network<G> for ScriptedNetwork<G> {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn forward(&mut self, input: ArrayView2<'_, f32>, _labels: &[f32]) -> Result<f32> {
        if self.panics {
            panic!("kernel launch failed");
        }

        if input.ncols() != self.input_dim {
            return Err(EngineErr::SizeMismatch {
                what: "scripted input",
                got: input.ncols(),
                expected: self.input_dim,
            });
        }

        self.rows = input.nrows();
        Ok(self.step as f32 + 1.)
    }

    fn backward(&mut self) -> Result<Array2<f32>> {
        let (step, scale, dim) = (self.step, self.loss_scale, self.input_dim);

        for (i, g) in self.grads.write().iter_mut().enumerate() {
            *g = G::narrow(synthetic_grad(step, i) * scale);
        }
        let d_input =
            Array2::from_shape_fn((self.rows, dim), |(r, c)| synthetic_grad(step, r * dim + c) * scale);

        self.step += 1;
        Ok(d_input)
    }

    fn predict(&mut self, input: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        Ok(input.rows().into_iter().map(|row| row.sum().clamp(0., 1.)).collect())
    }

    fn update_params(&mut self) -> Result<()> {
        let grads = self.grads.read();
        let mut params = self.params.write();
        self.optimizer.update_params(&grads, &mut params)
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.optimizer.set_learning_rate(learning_rate);
    }

    fn params_num(&self) -> usize {
        self.params.len()
    }

    fn init_values(&self, _seed: u64) -> Result<Vec<f32>> {
        Ok((0..self.params.len()).map(|i| i as f32 / 1000.).collect())
    }

    fn params(&self) -> &Buffer<f32> {
        &self.params
    }

    fn params_mut(&mut self) -> &mut Buffer<f32> {
        &mut self.params
    }

    fn grads(&self) -> &Buffer<G> {
        &self.grads
    }

    fn grads_mut(&mut self) -> &mut Buffer<G> {
        &mut self.grads
    }
}

pub fn group(devices: usize) -> Arc<DeviceGroup> {
    let specs: Vec<_> = (0..devices)
        .map(|id| DeviceSpec {
            id,
            memory_limit: 1 << 24,
        })
        .collect();
    Arc::new(DeviceGroup::new(&specs).unwrap())
}

/// Samples whose only feature is key `i` in a single slot.
pub fn one_key_samples<K: Key>(n: usize) -> Vec<Sample<K>> {
    (0..n)
        .map(|i| Sample {
            label: (i % 2) as f32,
            dense: Vec::new(),
            keys: vec![vec![vec![K::from_bits(i as u64).unwrap()]]],
        })
        .collect()
}

pub fn reader<K: Key>(samples: Vec<Sample<K>>, devices: usize, batch_size: usize) -> DataReader<K> {
    let shape = BatchShape {
        batch_size,
        dense_dim: 0,
        slots: vec![1],
    };
    DataReader::new(
        Box::new(InMemorySource::new(samples)),
        devices,
        shape,
        ExhaustionSpec::Loop,
        2,
    )
}

/// A session of `ScriptedNetwork`s over a single one slot table with vectors of size 1.
pub fn scripted_session<K: Key, G: Element>(
    devices: usize,
    keys: usize,
    weights: usize,
    optimizer: OptimizerSpec,
    loss_scale: f32,
    panicking: bool,
) -> TrainingSession<K, G> {
    let group = group(devices);
    let spec = EmbeddingSpec {
        slots: 1,
        vec_size: 1,
        max_vocabulary_per_device: keys,
        combiner: CombinerSpec::Sum,
        init: DistributionSpec::Uniform {
            low: -0.05,
            high: 0.05,
        },
    };
    let embedding = DistributedEmbedding::<K, G>::new(&group, &spec, &optimizer, loss_scale, 3).unwrap();

    let networks = group
        .iter()
        .map(|device| {
            let network = ScriptedNetwork::<G>::new(Arc::clone(device), weights, 1, &optimizer, loss_scale);
            let network = if panicking { network.panicking() } else { network };
            Box::new(network) as Box<dyn Network<G>>
        })
        .collect();

    let batch_size = keys / devices;
    TrainingSession::new(
        Arc::clone(&group),
        networks,
        vec![Box::new(embedding) as Box<dyn Embedding<K, G>>],
        reader(one_key_samples(keys), devices, batch_size),
        reader(one_key_samples(keys), devices, batch_size),
        Metrics::new(Vec::new()),
        0,
    )
    .unwrap()
}
