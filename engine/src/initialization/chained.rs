use super::ParamGen;

/// A parameter generator that delegates to a chain of generators, moving on
/// to the next one whenever the current one is exhausted.
///
/// Used to give each layer of a network its own initialization.
pub struct ChainedParamGen {
    param_gens: Vec<Box<dyn ParamGen>>,
    curr: usize,
}

impl ChainedParamGen {
    pub fn new(param_gens: Vec<Box<dyn ParamGen>>) -> Self {
        Self {
            param_gens,
            curr: 0,
        }
    }
}

impl ParamGen for ChainedParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        let mut sample = Vec::with_capacity(n);

        while sample.len() < n {
            let Some(param_gen) = self.param_gens.get_mut(self.curr) else {
                break;
            };

            match param_gen.sample(n - sample.len()) {
                Some(values) => sample.extend(values),
                None => self.curr += 1,
            }
        }

        (!sample.is_empty()).then_some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::{super::ConstParamGen, *};

    fn chain(values: &[(f32, usize)]) -> ChainedParamGen {
        ChainedParamGen::new(
            values
                .iter()
                .map(|&(value, limit)| Box::new(ConstParamGen::new(value, limit)) as Box<dyn ParamGen>)
                .collect(),
        )
    }

    #[test]
    fn samples_cross_generator_boundaries() {
        let mut param_gen = chain(&[(0., 1), (1., 3)]);

        assert_eq!(param_gen.sample(2), Some(vec![0., 1.]));
        assert_eq!(param_gen.sample(3), Some(vec![1., 1.]));
        assert_eq!(param_gen.sample(1), None);
    }

    #[test]
    fn nested_chains_are_flattened() {
        let mut param_gen = ChainedParamGen::new(vec![
            Box::new(ConstParamGen::new(0., 1)),
            Box::new(chain(&[(1., 1), (2., 1)])),
            Box::new(ConstParamGen::new(3., 1)),
        ]);

        assert_eq!(param_gen.sample(8), Some(vec![0., 1., 2., 3.]));
    }

    #[test]
    fn empty_chain_is_exhausted() {
        assert_eq!(chain(&[]).sample(1), None);
    }
}
