//! A data parallel training engine for click-through-rate models.
//!
//! Sparse features go through embedding tables hash partitioned over a group
//! of devices, dense features and embedding outputs feed one dense network
//! replica per device. Sessions are built from a [`specs::SessionSpec`] by a
//! [`session::SessionBuilder`].

pub mod checkpoint;
pub mod data;
pub mod device;
pub mod embedding;
mod error;
pub mod initialization;
pub mod metrics;
pub mod network;
pub mod optimization;
pub mod session;
pub mod storage;

pub use error::{EngineErr, Result};
pub use session::{Session, SessionBuilder, SessionState};
