mod dense;
mod layer;
mod layout;
mod loss;
mod network;

pub use dense::DenseNetwork;
pub use layer::Dense;
pub use layout::Layout;
pub use loss::{bce_with_logits, sigmoid};
pub use network::Network;
