use crate::{EngineErr, Result};

/// A `ParamGen` generates values for the initial state of the parameters.
pub trait ParamGen {
    /// Should sample at most `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The upper limit of samples to generate.
    ///
    /// # Returns
    /// `None` once the generator is exhausted.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;

    /// Fills the whole of `out` with freshly sampled values.
    ///
    /// # Returns
    /// `SizeMismatch` if the generator runs dry before `out` is full.
    fn fill(&mut self, out: &mut [f32]) -> Result<()> {
        let mut filled = 0;

        while filled < out.len() {
            let Some(sample) = self.sample(out.len() - filled) else {
                break;
            };

            out[filled..filled + sample.len()].copy_from_slice(&sample);
            filled += sample.len();
        }

        EngineErr::size_check("generated parameters", filled, out.len())
    }
}
