//! Experiment run report.

use serde::Serialize;

use stack_core::{ExperimentStatus, FailureClass};
use stack_types::{LogicalId, PhysicalId};

/// What happened during one experiment run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// The experiment template.
    pub experiment: LogicalId,
    /// Every status the run entered, in order.
    pub transitions: Vec<ExperimentStatus>,
    /// Instances the targets matched when the run started.
    pub matched: Vec<PhysicalId>,
    /// Instances whose termination the run started.
    pub affected: Vec<PhysicalId>,
    /// Action steps executed.
    pub steps_executed: u32,
    /// Wall time from start to finish in milliseconds.
    pub elapsed_ms: u64,
    /// Final status.
    pub outcome: ExperimentStatus,
}

impl RunReport {
    pub(crate) fn new(experiment: LogicalId) -> Self {
        Self {
            experiment,
            transitions: vec![ExperimentStatus::Pending],
            matched: Vec::new(),
            affected: Vec::new(),
            steps_executed: 0,
            elapsed_ms: 0,
            outcome: ExperimentStatus::Pending,
        }
    }

    /// Status names in order, e.g. `["PENDING", "RUNNING", "STOPPED"]`.
    pub fn status_names(&self) -> Vec<&'static str> {
        self.transitions.iter().map(|s| s.name()).collect()
    }

    /// Every step ran.
    pub fn is_completed(&self) -> bool {
        self.outcome == ExperimentStatus::Completed
    }

    /// The alarm that stopped the run, if one did.
    pub fn stopped_by(&self) -> Option<&LogicalId> {
        match &self.outcome {
            ExperimentStatus::Stopped { alarm } => Some(alarm),
            _ => None,
        }
    }

    /// Failure class and message, if the run failed.
    pub fn failure(&self) -> Option<(FailureClass, &str)> {
        match &self.outcome {
            ExperimentStatus::Failed { class, message } => Some((*class, message.as_str())),
            _ => None,
        }
    }
}
