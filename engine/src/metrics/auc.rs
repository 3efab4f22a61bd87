use super::Metric;

/// The area under the ROC curve, computed exactly from the ranks of the
/// predictions with ties sharing their average rank.
///
/// With no positives or no negatives the curve is undefined and 0.5 is reported.
#[derive(Debug, Default)]
pub struct Auc {
    scored: Vec<(f32, bool)>,
}

impl Metric for Auc {
    fn name(&self) -> &'static str {
        "AUC"
    }

    fn accumulate(&mut self, preds: &[f32], labels: &[f32]) {
        self.scored
            .extend(preds.iter().zip(labels).map(|(&p, &y)| (p, y > 0.5)));
    }

    fn value(&self) -> f32 {
        let positives = self.scored.iter().filter(|(_, y)| *y).count();
        let negatives = self.scored.len() - positives;
        if positives == 0 || negatives == 0 {
            return 0.5;
        }

        let mut sorted = self.scored.clone();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut rank_sum = 0f64;
        let mut start = 0;
        while start < sorted.len() {
            let end = start + sorted[start..]
                .iter()
                .take_while(|(p, _)| *p == sorted[start].0)
                .count();

            // ranks start..end (1-based start+1..=end) share their mean
            let rank = (start + 1 + end) as f64 / 2.;
            let tied_positives = sorted[start..end].iter().filter(|(_, y)| *y).count();
            rank_sum += rank * tied_positives as f64;
            start = end;
        }

        let (p, n) = (positives as f64, negatives as f64);
        ((rank_sum - p * (p + 1.) / 2.) / (p * n)) as f32
    }

    fn reset(&mut self) {
        self.scored.clear();
    }
}
