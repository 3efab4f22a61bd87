use super::ParamGen;

/// A parameter generator that always generates the same value.
#[derive(Debug)]
pub struct ConstParamGen {
    value: f32,
    remaining: usize,
}

impl ConstParamGen {
    /// Creates a new `ConstParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `value` - The value to always generate.
    /// * `limit` - The maximum amount of times to generate that value.
    pub fn new(value: f32, limit: usize) -> Self {
        Self {
            value,
            remaining: limit,
        }
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        let n = n.min(self.remaining);
        if n == 0 {
            return None;
        }

        self.remaining -= n;
        Some(vec![self.value; n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_its_limit() {
        let mut param_gen = ConstParamGen::new(0.5, 3);

        assert_eq!(param_gen.sample(2), Some(vec![0.5; 2]));
        assert_eq!(param_gen.sample(2), Some(vec![0.5]));
        assert_eq!(param_gen.sample(1), None);
    }

    #[test]
    fn fill_fails_when_the_limit_is_short() {
        let mut param_gen = ConstParamGen::new(1., 2);

        assert!(param_gen.fill(&mut [0.; 3]).is_err());
    }
}
