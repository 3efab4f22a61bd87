mod buffer;
mod element;

pub use buffer::Buffer;
pub use element::{Element, Precision};
