//! ROC curve, AUC and equal-error-rate for binary anomaly labels.

use crate::error::{GanomalyError, Result};

/// Summary of an ROC curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocMetrics {
    /// Area under the ROC curve.
    pub auc: f64,
    /// False-positive rate where it equals the false-negative rate.
    pub eer: f64,
    /// Score threshold of the curve point closest to the EER.
    pub eer_threshold: f64,
}

/// Points of an ROC curve, ordered by decreasing threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// ROC curve for `scores`, where label 1 is the positive (abnormal) class.
///
/// Tied scores form a single curve point. The curve starts at (0, 0) with
/// an infinite threshold. NaN or infinite scores are rejected.
pub fn roc_curve(labels: &[i64], scores: &[f32]) -> Result<RocCurve> {
    if labels.len() != scores.len() {
        return Err(GanomalyError::shape(labels.len(), scores.len()));
    }
    if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
        return Err(GanomalyError::Data(format!(
            "non-finite score {} at sample {index}",
            scores[index]
        )));
    }
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        let only = labels.first().copied().unwrap_or(0);
        return Err(GanomalyError::SingleClassLabels(only));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    let (mut tp, mut fp) = (0usize, 0usize);
    for (rank, &i) in order.iter().enumerate() {
        if labels[i] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = order
            .get(rank + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_tie {
            curve.fpr.push(fp as f64 / negatives as f64);
            curve.tpr.push(tp as f64 / positives as f64);
            curve.thresholds.push(scores[i] as f64);
        }
    }
    Ok(curve)
}

impl RocCurve {
    /// Trapezoidal area under the curve.
    pub fn auc(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(f, t)| (f[1] - f[0]) * (t[0] + t[1]) / 2.0)
            .sum()
    }

    /// Root of `1 - fpr - tpr(fpr)` on the linearly interpolated curve,
    /// with the threshold of the nearest curve point.
    pub fn eer(&self) -> (f64, f64) {
        let gap = |k: usize| 1.0 - self.fpr[k] - self.tpr[k];
        for k in 1..self.fpr.len() {
            let (g0, g1) = (gap(k - 1), gap(k));
            if g0 >= 0.0 && g1 <= 0.0 {
                let (f0, f1) = (self.fpr[k - 1], self.fpr[k]);
                if f1 == f0 || g0 == g1 {
                    return (f0, self.thresholds[k]);
                }
                let eer = f0 + g0 / (g0 - g1) * (f1 - f0);
                let nearest = if eer - f0 <= f1 - eer { k - 1 } else { k };
                return (eer, self.thresholds[nearest]);
            }
        }
        // gap ends at -1 at (1, 1), so a crossing always exists
        let last = self.fpr.len() - 1;
        (self.fpr[last], self.thresholds[last])
    }
}

/// AUC and EER of `scores` against binary `labels`.
///
/// Fails with [`GanomalyError::SingleClassLabels`] if only one class is present.
pub fn roc(labels: &[i64], scores: &[f32]) -> Result<RocMetrics> {
    let curve = roc_curve(labels, scores)?;
    let (eer, eer_threshold) = curve.eer();
    Ok(RocMetrics {
        auc: curve.auc(),
        eer,
        eer_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_perfect_separation() {
        let m = roc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]).unwrap();
        assert!(close(m.auc, 1.0));
        assert!(close(m.eer, 0.0));
    }

    #[test]
    fn test_inverted_scores() {
        let m = roc(&[1, 1, 0, 0], &[0.1, 0.2, 0.8, 0.9]).unwrap();
        assert!(close(m.auc, 0.0));
        assert!(close(m.eer, 1.0));
    }

    #[test]
    fn test_partial_overlap() {
        let m = roc(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]).unwrap();
        assert!(close(m.auc, 0.75), "auc {}", m.auc);
        assert!(close(m.eer, 0.5), "eer {}", m.eer);
    }

    #[test]
    fn test_ties_collapse_to_one_point() {
        let curve = roc_curve(&[0, 1, 0, 1], &[0.5, 0.5, 0.5, 0.5]).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 1.0]);
        assert!(close(curve.auc(), 0.5));
        assert!(close(curve.eer().0, 0.5));
    }

    #[test]
    fn test_single_class_is_error() {
        assert!(matches!(
            roc(&[0, 0, 0], &[0.1, 0.2, 0.3]),
            Err(GanomalyError::SingleClassLabels(0))
        ));
        assert!(roc(&[0, 1], &[0.1]).is_err());
    }

    #[test]
    fn test_non_finite_score_is_error() {
        assert!(matches!(
            roc(&[0, 1, 1], &[0.1, f32::NAN, 0.3]),
            Err(GanomalyError::Data(_))
        ));
        assert!(matches!(
            roc_curve(&[0, 1], &[f32::NEG_INFINITY, 0.3]),
            Err(GanomalyError::Data(_))
        ));
    }
}
