use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use specs::DistributionSpec;

use super::ParamGen;
use crate::{EngineErr, Result};

/// A validated sampling distribution.
#[derive(Debug, Clone, Copy)]
pub enum Dist {
    Uniform(Uniform<f32>),
    Normal(Normal<f32>),
}

impl Dist {
    /// Resolves a distribution specification.
    ///
    /// The fan based schemes are turned into their uniform or normal
    /// equivalents: Xavier uses `fan_in + fan_out`, Kaiming and LeCun use `fan_in`.
    ///
    /// # Returns
    /// `InvalidArgument` if the resulting distribution is ill formed.
    pub fn new(spec: &DistributionSpec) -> Result<Self> {
        let dist = match *spec {
            DistributionSpec::Uniform { low, high } => Self::uniform(low, high)?,
            DistributionSpec::Normal { mean, std_dev } => Self::normal(mean, std_dev)?,
            DistributionSpec::XavierUniform { fan_in, fan_out } => {
                let range = (6. / fan(fan_in + fan_out)?).sqrt();
                Self::uniform(-range, range)?
            }
            DistributionSpec::Xavier { fan_in, fan_out } => {
                Self::normal(0., (2. / fan(fan_in + fan_out)?).sqrt())?
            }
            DistributionSpec::Kaiming { fan_in } => Self::normal(0., (2. / fan(fan_in)?).sqrt())?,
            DistributionSpec::Lecun { fan_in } => Self::normal(0., (1. / fan(fan_in)?).sqrt())?,
            DistributionSpec::LecunUniform { fan_in } => {
                let range = (3. / fan(fan_in)?).sqrt();
                Self::uniform(-range, range)?
            }
        };

        Ok(dist)
    }

    fn uniform(low: f32, high: f32) -> Result<Self> {
        Ok(Self::Uniform(Uniform::new(low, high)?))
    }

    fn normal(mean: f32, std_dev: f32) -> Result<Self> {
        Ok(Self::Normal(Normal::new(mean, std_dev)?))
    }
}

fn fan(n: usize) -> Result<f32> {
    if n == 0 {
        return Err(EngineErr::InvalidArgument(
            "fan based initialization needs a non zero fan".into(),
        ));
    }

    Ok(n as f32)
}

impl Distribution<f32> for Dist {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        match self {
            Dist::Uniform(uniform) => uniform.sample(rng),
            Dist::Normal(normal) => normal.sample(rng),
        }
    }
}

/// A parameter generator that follows a certain probabilistic distribution.
pub struct RandParamGen<R: Rng> {
    rng: Rc<RefCell<R>>,
    dist: Dist,
    remaining: usize,
}

impl<R: Rng> RandParamGen<R> {
    /// Creates a new `RandParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `rng` - A random number generator, possibly shared with other generators.
    /// * `dist` - The distribution to sample the values from.
    /// * `limit` - The maximum amount of values to generate.
    pub fn new(rng: Rc<RefCell<R>>, dist: Dist, limit: usize) -> Self {
        Self {
            rng,
            dist,
            remaining: limit,
        }
    }
}

impl<R: Rng> ParamGen for RandParamGen<R> {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        let n = n.min(self.remaining);
        if n == 0 {
            return None;
        }

        self.remaining -= n;

        let mut rng = self.rng.borrow_mut();
        Some((0..n).map(|_| self.dist.sample(&mut *rng)).collect())
    }
}
