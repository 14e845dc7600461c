//! Experiment template declaration.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::alarm::SafetyAlarm;
use crate::compute::{ComputePool, InstanceState};
use crate::iam::{ExecutionRole, TERMINATE_INSTANCES_ACTION};
use crate::ids::Handle;

/// Key under which an action names the target it applies to.
pub const INSTANCES_TARGET_KEY: &str = "Instances";

/// Kind of resource a target selector picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetResourceType {
    /// Compute instances.
    Ec2Instance,
}

impl TargetResourceType {
    /// Fault-injection resource type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetResourceType::Ec2Instance => "aws:ec2:instance",
        }
    }
}

/// How many of the matching resources are picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SelectionMode {
    /// Every match.
    All,
    /// A random subset of this size.
    Count(u32),
    /// A random percentage of the matches, rounded down.
    Percent(u8),
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::All => f.write_str("ALL"),
            SelectionMode::Count(n) => write!(f, "COUNT({})", n),
            SelectionMode::Percent(p) => write!(f, "PERCENT({})", p),
        }
    }
}

/// Rule set deciding which live resources an action affects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSelector {
    /// Resource type.
    pub resource_type: TargetResourceType,
    /// Subset selection.
    pub selection_mode: SelectionMode,
    /// Pool whose instances are candidates.
    pub pool: Handle<ComputePool>,
    /// Tags every selected resource must carry.
    pub resource_tags: BTreeMap<String, String>,
    /// Accepted instance states.
    pub state_filter: Vec<InstanceState>,
}

impl TargetSelector {
    /// All running instances of `pool` carrying `key=value`.
    pub fn running_instances(pool: &Handle<ComputePool>, key: &str, value: &str) -> Self {
        let mut resource_tags = BTreeMap::new();
        resource_tags.insert(key.to_string(), value.to_string());
        Self {
            resource_type: TargetResourceType::Ec2Instance,
            selection_mode: SelectionMode::All,
            pool: pool.clone(),
            resource_tags,
            state_filter: vec![InstanceState::Running],
        }
    }

    /// Override the selection mode.
    pub fn selection_mode(mut self, mode: SelectionMode) -> Self {
        self.selection_mode = mode;
        self
    }
}

/// Fault action identifiers. Termination is the only one supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionKind {
    /// Terminate the selected instances.
    TerminateInstances,
}

impl ActionKind {
    /// Fault-injection action ID.
    pub fn action_id(&self) -> &'static str {
        match self {
            ActionKind::TerminateInstances => "aws:ec2:terminate-instances",
        }
    }

    /// The permission the execution role needs to perform this action.
    pub fn required_permission(&self) -> &'static str {
        match self {
            ActionKind::TerminateInstances => TERMINATE_INSTANCES_ACTION,
        }
    }
}

/// One fault action bound to a named target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentAction {
    /// Action kind.
    pub action: ActionKind,
    /// Action parameters.
    pub parameters: BTreeMap<String, String>,
    /// Name of the target (a key of the template's targets).
    pub target_binding: String,
}

impl ExperimentAction {
    /// Terminate the instances of `target`.
    pub fn terminate(target: &str) -> Self {
        Self {
            action: ActionKind::TerminateInstances,
            parameters: BTreeMap::new(),
            target_binding: target.into(),
        }
    }
}

/// Source of a stop condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StopConditionSource {
    /// A metric alarm.
    CloudWatchAlarm,
}

impl StopConditionSource {
    /// Fault-injection source name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StopConditionSource::CloudWatchAlarm => "aws:cloudwatch:alarm",
        }
    }
}

/// A live signal that halts the experiment while it is breaching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopCondition {
    /// Source kind.
    pub source: StopConditionSource,
    /// The alarm polled before and during the run.
    pub alarm: Handle<SafetyAlarm>,
}

impl StopCondition {
    /// Stop when `alarm` is in ALARM.
    pub fn alarm(alarm: &Handle<SafetyAlarm>) -> Self {
        Self {
            source: StopConditionSource::CloudWatchAlarm,
            alarm: alarm.clone(),
        }
    }
}

/// A fault-injection experiment: what to attack, how, as whom, and when to stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentTemplate {
    /// Human-readable description.
    pub description: String,
    /// Role the experiment runs as.
    pub role: Handle<ExecutionRole>,
    /// Stop conditions, all polled before every action step.
    pub stop_conditions: Vec<StopCondition>,
    /// Named target selectors.
    pub targets: BTreeMap<String, TargetSelector>,
    /// Named actions.
    pub actions: BTreeMap<String, ExperimentAction>,
    /// Template tags.
    pub tags: BTreeMap<String, String>,
}

impl ExperimentTemplate {
    /// An empty template running as `role`.
    pub fn new(description: &str, role: &Handle<ExecutionRole>) -> Self {
        Self {
            description: description.into(),
            role: role.clone(),
            stop_conditions: Vec::new(),
            targets: BTreeMap::new(),
            actions: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Add a stop condition.
    pub fn stop_when(mut self, condition: StopCondition) -> Self {
        self.stop_conditions.push(condition);
        self
    }

    /// Add a named target.
    pub fn target(mut self, name: &str, selector: TargetSelector) -> Self {
        self.targets.insert(name.into(), selector);
        self
    }

    /// Add a named action.
    pub fn action(mut self, name: &str, action: ExperimentAction) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    /// Add a tag.
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_mode_display() {
        assert_eq!(SelectionMode::All.to_string(), "ALL");
        assert_eq!(SelectionMode::Count(3).to_string(), "COUNT(3)");
        assert_eq!(SelectionMode::Percent(50).to_string(), "PERCENT(50)");
    }

    #[test]
    fn terminate_action_ids() {
        let action = ExperimentAction::terminate("pool");
        assert_eq!(action.action.action_id(), "aws:ec2:terminate-instances");
        assert_eq!(action.action.required_permission(), "ec2:TerminateInstances");
        assert!(action.parameters.is_empty());
        assert_eq!(action.target_binding, "pool");
    }
}
