mod batch;
mod reader;
mod source;

pub use batch::{Batch, BatchShape, Sample, SparseInput};
pub use reader::DataReader;
pub use source::{BatchSource, InMemorySource, SyntheticSource};
