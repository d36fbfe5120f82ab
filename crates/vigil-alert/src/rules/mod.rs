pub mod threshold;

pub use threshold::{MetricSource, ThresholdEvaluator};
