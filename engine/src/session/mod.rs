mod builder;
mod session;
mod training;

pub use builder::SessionBuilder;
pub use session::{Session, SessionState};
pub use training::TrainingSession;
