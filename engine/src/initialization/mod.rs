mod chained;
mod constant;
mod param_gen;
mod random;

pub use chained::ChainedParamGen;
pub use constant::ConstParamGen;
pub use param_gen::ParamGen;
pub use random::{Dist, RandParamGen};

use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use specs::ParamGenSpec;

use crate::Result;

/// Builds the parameter generator described by `spec`.
///
/// # Arguments
/// * `spec` - The generator's specification.
/// * `rng` - The random number generator shared by every random generator in the tree.
///
/// # Returns
/// The boxed generator or an error if a distribution is invalid.
pub fn build<R: Rng + 'static>(
    spec: &ParamGenSpec,
    rng: &Rc<RefCell<R>>,
) -> Result<Box<dyn ParamGen>> {
    let param_gen: Box<dyn ParamGen> = match spec {
        ParamGenSpec::Const { value, limit } => Box::new(ConstParamGen::new(*value, *limit)),
        ParamGenSpec::Rand {
            distribution,
            limit,
        } => Box::new(RandParamGen::new(
            Rc::clone(rng),
            Dist::new(distribution)?,
            *limit,
        )),
        ParamGenSpec::Chained { specs } => {
            let param_gens = specs
                .iter()
                .map(|spec| build(spec, rng))
                .collect::<Result<_>>()?;
            Box::new(ChainedParamGen::new(param_gens))
        }
    };

    Ok(param_gen)
}
