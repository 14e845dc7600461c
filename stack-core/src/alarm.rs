//! M-of-N alarm evaluation.
//!
//! [`AlarmEvaluator`] consumes one aggregated datapoint per period (or `None`
//! when the period had no data) and keeps the alarm state the way the
//! monitoring service does: the alarm fires when at least
//! `datapoints_to_alarm` of the last `evaluation_periods` periods breach.

use std::collections::VecDeque;

use stack_types::{AlarmState, ComparisonOperator, MissingDataPolicy, SafetyAlarm};

/// A change of alarm state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmTransition {
    /// State before the period.
    pub from: AlarmState,
    /// State after the period.
    pub to: AlarmState,
}

/// Rolling evaluation window for one alarm.
#[derive(Debug, Clone)]
pub struct AlarmEvaluator {
    threshold: f64,
    comparison: ComparisonOperator,
    evaluation_periods: usize,
    datapoints_to_alarm: usize,
    missing_data: MissingDataPolicy,
    window: VecDeque<Option<f64>>,
    state: AlarmState,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Slot {
    Breaching,
    Ok,
    Skipped,
}

impl AlarmEvaluator {
    /// Start evaluating `alarm` in `INSUFFICIENT_DATA`.
    pub fn new(alarm: &SafetyAlarm) -> Self {
        let evaluation_periods = alarm.evaluation_periods.max(1) as usize;
        Self {
            threshold: alarm.threshold,
            comparison: alarm.comparison,
            evaluation_periods,
            datapoints_to_alarm: (alarm.datapoints_to_alarm.max(1) as usize)
                .min(evaluation_periods),
            missing_data: alarm.missing_data,
            window: VecDeque::with_capacity(evaluation_periods),
            state: AlarmState::InsufficientData,
        }
    }

    /// Current state.
    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Feed the aggregated value of one closed period.
    ///
    /// Returns the transition if the state changed.
    pub fn observe(&mut self, datapoint: Option<f64>) -> Option<AlarmTransition> {
        if self.window.len() == self.evaluation_periods {
            self.window.pop_front();
        }
        self.window.push_back(datapoint);

        let next = self.evaluate();
        if next == self.state {
            return None;
        }
        let transition = AlarmTransition {
            from: self.state,
            to: next,
        };
        self.state = next;
        Some(transition)
    }

    fn classify(&self, datapoint: Option<f64>) -> Slot {
        match datapoint {
            Some(v) if self.comparison.breaches(v, self.threshold) => Slot::Breaching,
            Some(_) => Slot::Ok,
            None => match self.missing_data {
                MissingDataPolicy::NotBreaching => Slot::Ok,
                MissingDataPolicy::Breaching => Slot::Breaching,
                MissingDataPolicy::Ignore | MissingDataPolicy::Missing => Slot::Skipped,
            },
        }
    }

    fn evaluate(&self) -> AlarmState {
        let slots: Vec<Slot> = self.window.iter().map(|d| self.classify(*d)).collect();
        let breaching = slots.iter().filter(|s| **s == Slot::Breaching).count();
        if breaching >= self.datapoints_to_alarm {
            return AlarmState::Alarm;
        }
        if slots.iter().all(|s| *s == Slot::Skipped) {
            return match self.missing_data {
                MissingDataPolicy::Ignore => self.state,
                _ => AlarmState::InsufficientData,
            };
        }
        AlarmState::Ok
    }
}
