//! Test-time scoring: latent-distance anomaly scores, score tables and
//! ROC-based performance.

pub mod evaluator;
pub mod roc;

pub use evaluator::{
    anomaly_scores, average_first_timings, normalize_scores, Evaluator, EvaluatorState,
    Performance, TIMING_WINDOW,
};
pub use roc::{roc, roc_curve, RocCurve, RocMetrics};
