use std::ops::Range;

/// Where a layer's weights and bias live inside the flat parameter buffer.
///
/// The owner of the buffer borrows `span` with `Buffer::view` and hands that
/// slice to the layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub weights: Range<usize>,
    pub bias: Range<usize>,
}

impl Layout {
    /// Lays out consecutive layers back to back, each as its row-major
    /// `[in, out]` weights followed by its `out` biases.
    ///
    /// # Arguments
    /// * `dims` - The `(in, out)` dimension of every layer.
    ///
    /// # Returns
    /// One layout per layer.
    pub fn stack(dims: &[(usize, usize)]) -> Vec<Self> {
        let mut offset = 0;

        dims.iter()
            .map(|&(fan_in, fan_out)| {
                let weights = offset..offset + fan_in * fan_out;
                let bias = weights.end..weights.end + fan_out;
                offset = bias.end;
                Self { weights, bias }
            })
            .collect()
    }

    /// The whole range of the layer.
    pub fn span(&self) -> Range<usize> {
        self.weights.start..self.bias.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_are_packed_back_to_back() {
        let layouts = Layout::stack(&[(3, 2), (2, 1)]);

        assert_eq!(layouts[0].weights, 0..6);
        assert_eq!(layouts[0].bias, 6..8);
        assert_eq!(layouts[1].weights, 8..10);
        assert_eq!(layouts[1].bias, 10..11);
        assert_eq!(layouts[1].span(), 8..11);
    }
}
