mod distributed;
mod embedding;
mod key;
mod rows;
mod shard;

pub use distributed::DistributedEmbedding;
pub use embedding::{Embedding, SparseGrad};
pub use key::Key;
pub use rows::SparseRows;
pub use shard::EmbeddingShard;

pub(crate) use key::mix;
