mod data;
mod optimizer;
mod param_gen;
mod session;
mod solver;

pub use data::{DataSpec, ExhaustionSpec, SampleSpec, SourceSpec};
pub use optimizer::OptimizerSpec;
pub use param_gen::{DistributionSpec, ParamGenSpec, WeightInitSpec};
pub use session::{
    CombinerSpec, DeviceSpec, EmbeddingSpec, KeyTypeSpec, MetricSpec, NetworkSpec, PrecisionSpec,
    SessionSpec,
};
pub use solver::SolverSpec;
