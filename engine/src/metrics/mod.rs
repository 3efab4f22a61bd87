mod auc;
mod average_loss;
mod metric;

pub use auc::Auc;
pub use average_loss::AverageLoss;
pub use metric::{Metric, Metrics};
