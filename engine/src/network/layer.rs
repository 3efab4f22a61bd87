use ndarray::{linalg, prelude::*};

use super::Layout;
use crate::{EngineErr, Result};

/// A fully connected layer with an optional ReLU.
///
/// Its `Layout` tells the owner which span of the flat buffers to hand in,
/// the layer itself only sees that span.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    relu: bool,
    layout: Layout,

    // Forward metadata
    x: Array2<f32>,
    a: Array2<f32>,
}

impl Dense {
    pub fn new(dim: (usize, usize), relu: bool, layout: Layout) -> Self {
        Self {
            dim,
            relu,
            layout,
            x: Array2::zeros((0, dim.0)),
            a: Array2::zeros((0, dim.1)),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Computes `relu(x * w + b)`, or `x * w + b` for a linear layer.
    ///
    /// # Arguments
    /// * `params` - The layer's span of the parameter buffer.
    /// * `x` - The `[batch, in]` input.
    ///
    /// # Returns
    /// The `[batch, out]` output.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        EngineErr::size_check("layer input", x.ncols(), self.dim.0)?;

        let (w, b) = self.view_params(params)?;
        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        if self.relu {
            z.mapv_inplace(|z| z.max(0.));
        }

        self.x = x.to_owned();
        self.a.clone_from(&z);
        Ok(z)
    }

    /// Back propagates `d` through the layer.
    ///
    /// # Arguments
    /// * `params` - The layer's span of the parameter buffer.
    /// * `grads` - The layer's span of the gradient buffer, overwritten.
    /// * `d` - The gradient with respect to the layer's output.
    ///
    /// # Returns
    /// The gradient with respect to the layer's input.
    pub fn backward(
        &self,
        params: &[f32],
        grads: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        EngineErr::size_check("layer delta", d.nrows(), self.x.nrows())?;

        if self.relu {
            d.zip_mut_with(&self.a, |d, &a| {
                if a <= 0. {
                    *d = 0.;
                }
            });
        }

        let (mut dw, mut db) = self.view_grads(grads)?;
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        EngineErr::size_check("layer parameters", params.len(), self.layout.span().len())?;

        let (w, b) = params.split_at(self.layout.weights.len());
        Ok((ArrayView2::from_shape(self.dim, w)?, ArrayView1::from_shape(self.dim.1, b)?))
    }

    fn view_grads<'a>(
        &self,
        grads: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        EngineErr::size_check("layer gradients", grads.len(), self.layout.span().len())?;

        let (dw, db) = grads.split_at_mut(self.layout.weights.len());
        let dw = ArrayViewMut2::from_shape(self.dim, dw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db)?;
        Ok((dw, db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(relu: bool) -> Dense {
        Dense::new((2, 2), relu, Layout::stack(&[(2, 2)]).remove(0))
    }

    // w = [[1, -1], [2, 0]], b = [0.5, -3]
    const PARAMS: [f32; 6] = [1., -1., 2., 0., 0.5, -3.];

    #[test]
    fn forward_applies_weights_bias_and_relu() {
        let x = array![[1., 1.]];

        let linear = layer(false).forward(&PARAMS, x.view()).unwrap();
        let relu = layer(true).forward(&PARAMS, x.view()).unwrap();

        assert_eq!(linear, array![[3.5, -4.]]);
        assert_eq!(relu, array![[3.5, 0.]]);
    }

    #[test]
    fn backward_masks_inactive_units() {
        let mut layer = layer(true);
        let x = array![[1., 1.]];
        layer.forward(&PARAMS, x.view()).unwrap();

        let mut grads = [0.; 6];
        let dx = layer
            .backward(&PARAMS, &mut grads, array![[1., 1.]])
            .unwrap();

        assert_eq!(grads, [1., 0., 1., 0., 1., 0.]);
        assert_eq!(dx, array![[1., 2.]]);
    }

    #[test]
    fn a_slice_of_the_wrong_length_is_rejected() {
        let x = array![[1., 1.]];

        let err = layer(false).forward(&PARAMS[..5], x.view()).unwrap_err();

        assert!(matches!(err, EngineErr::SizeMismatch { .. }));
    }
}
