//! Safety alarm declaration.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::compute::ComputePool;
use crate::ids::Handle;

/// Namespace of Auto Scaling group metrics.
pub const AUTOSCALING_NAMESPACE: &str = "AWS/AutoScaling";

/// Group metric counting instances that are terminating.
pub const TERMINATING_INSTANCES_METRIC: &str = "GroupTerminatingInstances";

/// The metric an alarm watches, dimensioned by a compute pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricRef {
    /// Metric namespace.
    pub namespace: String,
    /// Metric name.
    pub name: String,
    /// Pool the metric is dimensioned by (`AutoScalingGroupName`).
    pub pool: Handle<ComputePool>,
}

impl MetricRef {
    /// The terminating-instance count of a pool.
    pub fn terminating_instances(pool: &Handle<ComputePool>) -> Self {
        Self {
            namespace: AUTOSCALING_NAMESPACE.into(),
            name: TERMINATING_INSTANCES_METRIC.into(),
            pool: pool.clone(),
        }
    }

    /// Whether this is the terminating-instance metric.
    pub fn is_terminating_instances(&self) -> bool {
        self.namespace == AUTOSCALING_NAMESPACE && self.name == TERMINATING_INSTANCES_METRIC
    }
}

/// How the datapoints of one period are reduced to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Statistic {
    /// Largest sample.
    Maximum,
    /// Smallest sample.
    Minimum,
    /// Mean of the samples.
    Average,
    /// Sum of the samples.
    Sum,
}

impl Statistic {
    /// Reduce samples; `None` when there are none.
    pub fn aggregate(&self, samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let value = match self {
            Statistic::Maximum => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Statistic::Minimum => samples.iter().copied().fold(f64::INFINITY, f64::min),
            Statistic::Sum => samples.iter().sum(),
            Statistic::Average => samples.iter().sum::<f64>() / samples.len() as f64,
        };
        Some(value)
    }
}

/// Comparison between a datapoint and the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComparisonOperator {
    /// value >= threshold
    GreaterThanOrEqualToThreshold,
    /// value > threshold
    GreaterThanThreshold,
    /// value < threshold
    LessThanThreshold,
    /// value <= threshold
    LessThanOrEqualToThreshold,
}

impl ComparisonOperator {
    /// Whether `value` breaches `threshold`.
    pub fn breaches(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThanOrEqualToThreshold => value >= threshold,
            ComparisonOperator::GreaterThanThreshold => value > threshold,
            ComparisonOperator::LessThanThreshold => value < threshold,
            ComparisonOperator::LessThanOrEqualToThreshold => value <= threshold,
        }
    }

    /// Whether larger values breach.
    pub fn is_upper_bound(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::GreaterThanOrEqualToThreshold
                | ComparisonOperator::GreaterThanThreshold
        )
    }
}

/// How periods with no datapoint are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MissingDataPolicy {
    /// Missing periods count as within threshold.
    NotBreaching,
    /// Missing periods count as breaching.
    Breaching,
    /// Missing periods keep the current state.
    Ignore,
    /// Missing periods are reported as insufficient data.
    Missing,
}

impl MissingDataPolicy {
    /// CloudWatch `TreatMissingData` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingDataPolicy::NotBreaching => "notBreaching",
            MissingDataPolicy::Breaching => "breaching",
            MissingDataPolicy::Ignore => "ignore",
            MissingDataPolicy::Missing => "missing",
        }
    }
}

/// Live state of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    /// Within threshold.
    Ok,
    /// Breaching.
    Alarm,
    /// Not enough data to decide.
    InsufficientData,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlarmState::Ok => "OK",
            AlarmState::Alarm => "ALARM",
            AlarmState::InsufficientData => "INSUFFICIENT_DATA",
        };
        f.write_str(s)
    }
}

/// A metric alarm used as an experiment stop condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyAlarm {
    /// Watched metric.
    pub metric: MetricRef,
    /// Reduction applied per period.
    pub statistic: Statistic,
    /// Length of one evaluation period.
    pub period: Duration,
    /// Threshold the statistic is compared with.
    pub threshold: f64,
    /// Comparison direction.
    pub comparison: ComparisonOperator,
    /// Number of most recent periods considered (N).
    pub evaluation_periods: u32,
    /// Breaching periods among those that trigger the alarm (M).
    pub datapoints_to_alarm: u32,
    /// Treatment of periods with no datapoint.
    pub missing_data: MissingDataPolicy,
}

impl SafetyAlarm {
    /// Alarm when a pool has `threshold` or more instances terminating within one period.
    pub fn terminating_instances(
        pool: &Handle<ComputePool>,
        threshold: f64,
        period: Duration,
    ) -> Self {
        Self {
            metric: MetricRef::terminating_instances(pool),
            statistic: Statistic::Maximum,
            period,
            threshold,
            comparison: ComparisonOperator::GreaterThanOrEqualToThreshold,
            evaluation_periods: 1,
            datapoints_to_alarm: 1,
            missing_data: MissingDataPolicy::NotBreaching,
        }
    }

    /// Override the comparison direction.
    pub fn comparison(mut self, comparison: ComparisonOperator) -> Self {
        self.comparison = comparison;
        self
    }

    /// Override M-of-N evaluation.
    pub fn evaluate(mut self, datapoints_to_alarm: u32, evaluation_periods: u32) -> Self {
        self.datapoints_to_alarm = datapoints_to_alarm;
        self.evaluation_periods = evaluation_periods;
        self
    }

    /// Override missing-data treatment.
    pub fn missing_data(mut self, policy: MissingDataPolicy) -> Self {
        self.missing_data = policy;
        self
    }

    /// Longest time a breach can go unreported: one full evaluation window.
    pub fn detection_window(&self) -> Duration {
        self.period * self.evaluation_periods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_directions() {
        let gte = ComparisonOperator::GreaterThanOrEqualToThreshold;
        assert!(gte.breaches(2.0, 2.0));
        assert!(!gte.breaches(1.0, 2.0));
        assert!(gte.is_upper_bound());

        let lt = ComparisonOperator::LessThanThreshold;
        assert!(lt.breaches(1.0, 2.0));
        assert!(!lt.breaches(2.0, 2.0));
        assert!(!lt.is_upper_bound());
    }

    #[test]
    fn statistic_aggregate() {
        let samples = [1.0, 4.0, 2.0];
        assert_eq!(Statistic::Maximum.aggregate(&samples), Some(4.0));
        assert_eq!(Statistic::Minimum.aggregate(&samples), Some(1.0));
        assert_eq!(Statistic::Sum.aggregate(&samples), Some(7.0));
        assert_eq!(Statistic::Average.aggregate(&[2.0, 4.0]), Some(3.0));
        assert_eq!(Statistic::Maximum.aggregate(&[]), None);
    }

    #[test]
    fn alarm_state_display() {
        assert_eq!(AlarmState::InsufficientData.to_string(), "INSUFFICIENT_DATA");
        assert_eq!(AlarmState::Alarm.to_string(), "ALARM");
    }

    #[test]
    fn missing_data_names() {
        assert_eq!(MissingDataPolicy::NotBreaching.as_str(), "notBreaching");
    }
}
