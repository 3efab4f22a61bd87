use std::{cell::RefCell, rc::Rc, sync::Arc};

use ndarray::{Array2, ArrayView2};
use rand::{SeedableRng, rngs::StdRng};
use specs::{NetworkSpec, OptimizerSpec, ParamGenSpec, WeightInitSpec};

use super::{
    Dense, Layout, Network,
    loss::{bce_delta, bce_with_logits, sigmoid},
};
use crate::{
    EngineErr, Result,
    device::Device,
    initialization, optimization,
    optimization::Optimizer,
    storage::{Buffer, Element},
};

/// A multilayer perceptron with ReLU hidden layers and a single logit output
/// trained with binary cross-entropy.
pub struct DenseNetwork<G: Element> {
    device: Arc<Device>,
    input_dim: usize,
    layers: Vec<Dense>,
    weight_init: WeightInitSpec,
    params: Buffer<f32>,
    grads: Buffer<G>,
    scratch: Vec<f32>,
    optimizer: Box<dyn Optimizer<G>>,
    loss_scale: f32,

    // Forward metadata
    logits: Array2<f32>,
    labels: Vec<f32>,
}

impl<G: Element> DenseNetwork<G> {
    /// Creates a new `DenseNetwork` with zeroed parameters.
    ///
    /// # Arguments
    /// * `device` - The device the replica lives on.
    /// * `spec` - The hidden layers and initialization scheme.
    /// * `input_dim` - The width of the input, dense features plus embedding outputs.
    /// * `optimizer` - The optimizer's specification.
    /// * `loss_scale` - The factor the loss gradient is multiplied by.
    ///
    /// # Returns
    /// A new `DenseNetwork` or an error if a dimension is zero or the buffers don't fit the device.
    pub fn new(
        device: Arc<Device>,
        spec: &NetworkSpec,
        input_dim: usize,
        optimizer: &OptimizerSpec,
        loss_scale: f32,
    ) -> Result<Self> {
        if input_dim == 0 || spec.hidden.contains(&0) {
            return Err(EngineErr::InvalidArgument(format!(
                "network dimensions must be non zero, got input {input_dim} and hidden {:?}",
                spec.hidden
            )));
        }

        let widths: Vec<_> = std::iter::once(input_dim)
            .chain(spec.hidden.iter().copied())
            .chain(std::iter::once(1))
            .collect();
        let dims: Vec<_> = widths.windows(2).map(|w| (w[0], w[1])).collect();

        let layouts = Layout::stack(&dims);
        let len = layouts.last().map_or(0, |layout| layout.bias.end);
        let hidden = dims.len() - 1;
        let layers = dims
            .into_iter()
            .zip(layouts)
            .enumerate()
            .map(|(i, (dim, layout))| Dense::new(dim, i < hidden, layout))
            .collect();

        Ok(Self {
            params: Buffer::new(Arc::clone(&device), len)?,
            grads: Buffer::new(Arc::clone(&device), len)?,
            device,
            input_dim,
            layers,
            weight_init: spec.weight_init,
            scratch: vec![0.; len],
            optimizer: optimization::build::<G>(optimizer, len, loss_scale),
            loss_scale,
            logits: Array2::zeros((0, 1)),
            labels: Vec::new(),
        })
    }

    fn logits(&mut self, input: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        EngineErr::size_check("network input", input.ncols(), self.input_dim)?;

        let mut x = input.to_owned();
        for layer in &mut self.layers {
            let params = self.params.view(layer.layout().span())?;
            x = layer.forward(&params, x.view())?;
        }

        Ok(x)
    }
}

impl<G: Element> Network<G> for DenseNetwork<G> {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn forward(&mut self, input: ArrayView2<'_, f32>, labels: &[f32]) -> Result<f32> {
        EngineErr::size_check("labels", labels.len(), input.nrows())?;

        self.logits = self.logits(input)?;
        self.labels = labels.to_vec();
        Ok(bce_with_logits(self.logits.view(), labels))
    }

    fn backward(&mut self) -> Result<Array2<f32>> {
        if self.labels.is_empty() {
            return Err(EngineErr::NotReady("backward needs a forward pass first"));
        }

        let mut d = bce_delta(self.logits.view(), &self.labels, self.loss_scale);
        for layer in self.layers.iter().rev() {
            let span = layer.layout().span();
            let params = self.params.view(span.clone())?;
            let scratch = &mut self.scratch[span.clone()];
            d = layer.backward(&params, scratch, d)?;

            self.grads
                .view_mut(span)?
                .iter_mut()
                .zip(scratch.iter())
                .for_each(|(g, s)| *g = G::narrow(*s));
        }
        self.labels.clear();

        Ok(d)
    }

    fn predict(&mut self, input: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        Ok(self.logits(input)?.iter().map(|&z| sigmoid(z)).collect())
    }

    fn update_params(&mut self) -> Result<()> {
        self.optimizer
            .update_params(&self.grads.read(), &mut self.params.write())
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.optimizer.set_learning_rate(learning_rate);
    }

    fn params_num(&self) -> usize {
        self.params.len()
    }

    fn init_values(&self, seed: u64) -> Result<Vec<f32>> {
        let specs = self
            .layers
            .iter()
            .flat_map(|layer| {
                let (fan_in, fan_out) = layer.dim();
                [
                    ParamGenSpec::Rand {
                        distribution: self.weight_init.distribution(fan_in, fan_out),
                        limit: fan_in * fan_out,
                    },
                    ParamGenSpec::Const {
                        value: 0.,
                        limit: fan_out,
                    },
                ]
            })
            .collect();

        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(seed)));
        let mut values = vec![0.; self.params_num()];
        initialization::build(&ParamGenSpec::Chained { specs }, &rng)?.fill(&mut values)?;
        Ok(values)
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
