//! Experiment run state machine.
//!
//! This module provides a pure, side-effect-free state machine for one
//! experiment run. It takes events as input and produces a new state plus a
//! list of directives for the runner to execute.
//!
//! ```text
//! Pending ──Validated──▶ Running ──ActionsExhausted / last step──▶ Completed
//!    │                     │ └──StopConditionBreached──▶ Stopped
//!    └─ValidationFailed─▶ Failed ◀──StepFailed──┘
//! ```
//!
//! `Stopped` is a success path: the safety interlock did its job.

use serde::Serialize;
use std::fmt;

use stack_types::LogicalId;

/// Error class of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// A reference could not be resolved before the run.
    GraphResolution,
    /// The execution role lacks a permission.
    Authorization,
    /// An action step failed for another reason.
    Execution,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureClass::GraphResolution => "graph resolution",
            FailureClass::Authorization => "authorization",
            FailureClass::Execution => "execution",
        };
        f.write_str(s)
    }
}

/// Run status - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    /// Created, references not yet resolved.
    Pending,
    /// Executing action steps.
    Running {
        /// Steps finished so far.
        completed_steps: u32,
        /// Steps planned.
        total_steps: u32,
    },
    /// Every step ran.
    Completed,
    /// A stop condition was breaching; remaining steps were abandoned.
    Stopped {
        /// The alarm that stopped the run.
        alarm: LogicalId,
    },
    /// The run could not proceed.
    Failed {
        /// Error class.
        class: FailureClass,
        /// Error message.
        message: String,
    },
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExperimentEvent {
    /// Role, targets and stop conditions resolved; `total_steps` batches planned.
    Validated {
        /// Planned action steps.
        total_steps: u32,
    },
    /// Resolution failed.
    ValidationFailed {
        /// Error class.
        class: FailureClass,
        /// Error message.
        message: String,
    },
    /// Every stop condition polled clear.
    StopConditionsClear,
    /// A stop condition is breaching.
    StopConditionBreached {
        /// The breaching alarm.
        alarm: LogicalId,
    },
    /// One action step finished.
    StepCompleted,
    /// One action step failed.
    StepFailed {
        /// Error class.
        class: FailureClass,
        /// Error message.
        message: String,
    },
}

/// What the runner must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Read every stop-condition alarm.
    PollStopConditions,
    /// Execute the next action step.
    ExecuteNextStep,
    /// The run reached a terminal state.
    Finish,
}

impl ExperimentStatus {
    /// Create a new run in the Pending state.
    pub fn new() -> Self {
        Self::Pending
    }

    /// Process an event and return the new state plus directives to execute.
    ///
    /// This is a pure function - no side effects. The runner is responsible
    /// for executing the returned directives.
    pub fn on_event(self, event: ExperimentEvent) -> (Self, Vec<Directive>) {
        match (self, event) {
            // From Pending
            (Self::Pending, ExperimentEvent::Validated { total_steps }) => (
                Self::Running {
                    completed_steps: 0,
                    total_steps,
                },
                vec![Directive::PollStopConditions],
            ),
            (Self::Pending, ExperimentEvent::ValidationFailed { class, message }) => {
                (Self::Failed { class, message }, vec![Directive::Finish])
            }

            // From Running
            (
                Self::Running {
                    completed_steps,
                    total_steps,
                },
                ExperimentEvent::StopConditionsClear,
            ) => {
                if completed_steps < total_steps {
                    (
                        Self::Running {
                            completed_steps,
                            total_steps,
                        },
                        vec![Directive::ExecuteNextStep],
                    )
                } else {
                    (Self::Completed, vec![Directive::Finish])
                }
            }
            (Self::Running { .. }, ExperimentEvent::StopConditionBreached { alarm }) => {
                (Self::Stopped { alarm }, vec![Directive::Finish])
            }
            (
                Self::Running {
                    completed_steps,
                    total_steps,
                },
                ExperimentEvent::StepCompleted,
            ) => {
                let completed_steps = completed_steps.saturating_add(1);
                if completed_steps >= total_steps {
                    (Self::Completed, vec![Directive::Finish])
                } else {
                    (
                        Self::Running {
                            completed_steps,
                            total_steps,
                        },
                        vec![Directive::PollStopConditions],
                    )
                }
            }
            (Self::Running { .. }, ExperimentEvent::StepFailed { class, message }) => {
                (Self::Failed { class, message }, vec![Directive::Finish])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Upper-case status name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running { .. } => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Stopped { .. } => "STOPPED",
            Self::Failed { .. } => "FAILED",
        }
    }

    /// Check if the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Stopped { .. } | Self::Failed { .. }
        )
    }
}

impl Default for ExperimentStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
