use super::Metric;

/// The mean binary cross-entropy of the predictions.
#[derive(Debug, Default)]
pub struct AverageLoss {
    sum: f64,
    count: usize,
}

const EPS: f32 = 1e-7;

impl Metric for AverageLoss {
    fn name(&self) -> &'static str {
        "AverageLoss"
    }

    fn accumulate(&mut self, preds: &[f32], labels: &[f32]) {
        for (&p, &y) in preds.iter().zip(labels) {
            let p = p.clamp(EPS, 1. - EPS);
            self.sum -= f64::from(y * p.ln() + (1. - y) * (1. - p).ln());
            self.count += 1;
        }
    }

    fn value(&self) -> f32 {
        if self.count == 0 {
            return 0.;
        }

        (self.sum / self.count as f64) as f32
    }

    fn reset(&mut self) {
        self.sum = 0.;
        self.count = 0;
    }
}
