//! Assertion helpers for chaos testing.
//!
//! These are pure functions that verify stack state after a chaos scenario
//! completes. They take state as input and return pass/fail.

use std::collections::BTreeSet;

use stack_core::{ExperimentStatus, InstanceSnapshot};
use stack_engine::{LoadBalancerDescription, RunReport, TargetHealth, TargetHealthState};
use stack_types::{InstanceState, LogicalId, PhysicalId};

/// Snapshot of a compute pool for assertion checking.
#[derive(Debug, Clone)]
pub struct PoolState {
    /// Pool physical ID.
    pub pool: PhysicalId,
    /// Configured minimum size.
    pub min_size: u32,
    /// Live (non-terminated) instances.
    pub instances: Vec<InstanceSnapshot>,
}

impl PoolState {
    /// IDs of instances in `state`.
    pub fn in_state(&self, state: InstanceState) -> BTreeSet<PhysicalId> {
        self.instances
            .iter()
            .filter(|i| i.state == state)
            .map(|i| i.id.clone())
            .collect()
    }

    /// IDs of every live instance.
    pub fn members(&self) -> BTreeSet<PhysicalId> {
        self.instances.iter().map(|i| i.id.clone()).collect()
    }
}

/// Result of an assertion check.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }
}

/// Assert that a pool is back at full strength.
///
/// At least `min_size` instances must be running and none may be booting
/// or shutting down.
pub fn assert_pool_healed(pool: &PoolState) -> AssertionResult {
    let running = pool.in_state(InstanceState::Running).len();
    let settling = pool.instances.len() - running;

    if running < pool.min_size as usize {
        return AssertionResult::fail(
            "Pool healed check",
            &format!(
                "Pool {} has {} running instances, needs {}",
                pool.pool, running, pool.min_size
            ),
        );
    }
    if settling > 0 {
        return AssertionResult::fail(
            "Pool healed check",
            &format!("Pool {} still has {} instances settling", pool.pool, settling),
        );
    }

    AssertionResult::pass(&format!(
        "Pool {} healed with {} running instances",
        pool.pool, running
    ))
}

/// Assert that a run only touched instances of the targeted pool.
///
/// `members` is the pool's membership when the run started.
pub fn assert_only_pool_affected(
    report: &RunReport,
    members: &BTreeSet<PhysicalId>,
) -> AssertionResult {
    for id in report.matched.iter().chain(&report.affected) {
        if !members.contains(id) {
            return AssertionResult::fail(
                "Blast radius check",
                &format!("Instance {} is outside the targeted pool", id),
            );
        }
    }
    for id in &report.affected {
        if !report.matched.contains(id) {
            return AssertionResult::fail(
                "Blast radius check",
                &format!("Instance {} was affected but never matched", id),
            );
        }
    }

    AssertionResult::pass(&format!(
        "All {} affected instances belong to the pool",
        report.affected.len()
    ))
}

/// Assert that the run stopped on an alarm before all steps ran.
pub fn assert_stopped_before_completion(report: &RunReport) -> AssertionResult {
    let Some(alarm) = report.stopped_by() else {
        return AssertionResult::fail(
            "Stop condition check",
            &format!("Run ended {} instead of STOPPED", report.outcome),
        );
    };

    let total_steps = report.transitions.iter().find_map(|s| match s {
        ExperimentStatus::Running { total_steps, .. } => Some(*total_steps),
        _ => None,
    });
    if let Some(total) = total_steps {
        if report.steps_executed >= total {
            return AssertionResult::fail(
                "Stop condition check",
                &format!(
                    "Stopped by {} only after all {} steps ran",
                    alarm, total
                ),
            );
        }
    }

    AssertionResult::pass(&format!(
        "Stopped by {} after {} steps",
        alarm, report.steps_executed
    ))
}

/// Assert the exact sequence of statuses a run went through.
pub fn assert_transitions(report: &RunReport, expected: &[&str]) -> AssertionResult {
    let actual = report.status_names();
    if actual == expected {
        AssertionResult::pass(&format!("Run went {}", expected.join(" -> ")))
    } else {
        AssertionResult::fail(
            "Status transition check",
            &format!(
                "Expected {}, got {}",
                expected.join(" -> "),
                actual.join(" -> ")
            ),
        )
    }
}

/// Assert that some listener on `port` forwards to `pool` on the same port.
pub fn assert_listener_routes_to_pool(
    balancer: &LoadBalancerDescription,
    pool: &PhysicalId,
    port: u16,
) -> AssertionResult {
    let routed = balancer
        .listeners
        .iter()
        .any(|l| l.port == port && &l.target_pool == pool && l.target_port == port);

    if routed {
        AssertionResult::pass(&format!(
            "{} routes port {} to {}",
            balancer.dns_name, port, pool
        ))
    } else {
        AssertionResult::fail(
            "Listener routing check",
            &format!(
                "{} has {} listeners, none forwards port {} to {}",
                balancer.dns_name,
                balancer.listeners.len(),
                port,
                pool
            ),
        )
    }
}

/// Assert that exactly `instances` receive traffic.
pub fn assert_traffic_targets(
    targets: &[TargetHealth],
    instances: &BTreeSet<PhysicalId>,
) -> AssertionResult {
    let serving: BTreeSet<PhysicalId> = targets
        .iter()
        .filter(|t| t.state.receives_traffic())
        .map(|t| t.instance.clone())
        .collect();

    if &serving == instances {
        AssertionResult::pass(&format!("{} targets receive traffic", serving.len()))
    } else {
        AssertionResult::fail(
            "Traffic target check",
            &format!("Expected {:?} to receive traffic, got {:?}", instances, serving),
        )
    }
}

/// Assert that no target is in `state`.
pub fn assert_no_target_in(targets: &[TargetHealth], state: TargetHealthState) -> AssertionResult {
    match targets.iter().find(|t| t.state == state) {
        Some(target) => AssertionResult::fail(
            "Target health check",
            &format!("Target {} is {:?}", target.instance, state),
        ),
        None => AssertionResult::pass(&format!("No target is {:?}", state)),
    }
}

/// Assert that teardown ran in exact reverse creation order.
pub fn assert_reverse_order(created: &[&LogicalId], destroyed: &[LogicalId]) -> AssertionResult {
    let expected: Vec<&LogicalId> = created.iter().rev().copied().collect();
    let actual: Vec<&LogicalId> = destroyed.iter().collect();
    if expected == actual {
        AssertionResult::pass(&format!("{} resources torn down in reverse", actual.len()))
    } else {
        AssertionResult::fail(
            "Teardown order check",
            &format!("Expected {:?}, got {:?}", expected, actual),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stack_core::FailureClass;
    use stack_engine::ListenerDescription;
    use std::collections::BTreeMap;

    fn id(s: &str) -> PhysicalId {
        PhysicalId::new(s)
    }

    fn instance(s: &str, state: InstanceState) -> InstanceSnapshot {
        InstanceSnapshot {
            id: id(s),
            pool: Some(id("asg")),
            state,
            tags: BTreeMap::new(),
        }
    }

    fn report(outcome: ExperimentStatus, matched: &[&str], affected: &[&str]) -> RunReport {
        RunReport {
            experiment: LogicalId::new("chaosExperiment").unwrap(),
            transitions: vec![
                ExperimentStatus::Pending,
                ExperimentStatus::Running {
                    completed_steps: 0,
                    total_steps: matched.len() as u32,
                },
                outcome.clone(),
            ],
            matched: matched.iter().map(|s| id(s)).collect(),
            affected: affected.iter().map(|s| id(s)).collect(),
            steps_executed: affected.len() as u32,
            elapsed_ms: 0,
            outcome,
        }
    }

    #[test]
    fn test_pool_healed_pass() {
        let pool = PoolState {
            pool: id("asg"),
            min_size: 2,
            instances: vec![
                instance("i-1", InstanceState::Running),
                instance("i-2", InstanceState::Running),
            ],
        };
        assert!(assert_pool_healed(&pool).passed);
    }

    #[test]
    fn test_pool_healed_fail_while_booting() {
        let pool = PoolState {
            pool: id("asg"),
            min_size: 2,
            instances: vec![
                instance("i-1", InstanceState::Running),
                instance("i-2", InstanceState::Running),
                instance("i-3", InstanceState::Pending),
            ],
        };
        let result = assert_pool_healed(&pool);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("settling"));
    }

    #[test]
    fn test_only_pool_affected_fail() {
        let members: BTreeSet<_> = [id("i-1"), id("i-2")].into();
        let run = report(ExperimentStatus::Completed, &["i-1", "i-9"], &["i-1", "i-9"]);
        let result = assert_only_pool_affected(&run, &members);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("i-9"));
    }

    #[test]
    fn test_stopped_before_completion() {
        let stopped = ExperimentStatus::Stopped {
            alarm: LogicalId::new("chaosStopAlarm").unwrap(),
        };
        let run = report(stopped, &["i-1", "i-2", "i-3"], &["i-1"]);
        assert!(assert_stopped_before_completion(&run).passed);

        let failed = ExperimentStatus::Failed {
            class: FailureClass::Authorization,
            message: "denied".into(),
        };
        let run = report(failed, &["i-1"], &[]);
        assert!(!assert_stopped_before_completion(&run).passed);
    }

    #[test]
    fn test_transitions() {
        let run = report(ExperimentStatus::Completed, &["i-1"], &["i-1"]);
        assert!(assert_transitions(&run, &["PENDING", "RUNNING", "COMPLETED"]).passed);
        assert!(!assert_transitions(&run, &["PENDING", "RUNNING", "STOPPED"]).passed);
    }

    #[test]
    fn test_listener_routing() {
        let balancer = LoadBalancerDescription {
            dns_name: "lb-123.eu-north-1.elb.amazonaws.com".into(),
            scheme: "internet-facing".into(),
            listeners: vec![ListenerDescription {
                port: 80,
                protocol: "HTTP".into(),
                target_pool: id("asg"),
                target_port: 80,
            }],
        };
        assert!(assert_listener_routes_to_pool(&balancer, &id("asg"), 80).passed);
        assert!(!assert_listener_routes_to_pool(&balancer, &id("other"), 80).passed);
        assert!(!assert_listener_routes_to_pool(&balancer, &id("asg"), 443).passed);
    }

    #[test]
    fn test_traffic_targets() {
        let targets = vec![
            TargetHealth {
                instance: id("i-1"),
                state: TargetHealthState::Healthy,
            },
            TargetHealth {
                instance: id("i-2"),
                state: TargetHealthState::Unhealthy,
            },
        ];
        let expected: BTreeSet<_> = [id("i-1")].into();
        assert!(assert_traffic_targets(&targets, &expected).passed);
        assert!(!assert_no_target_in(&targets, TargetHealthState::Unhealthy).passed);
        assert!(assert_no_target_in(&targets, TargetHealthState::Draining).passed);
    }

    #[test]
    fn test_reverse_order() {
        let a = LogicalId::new("a").unwrap();
        let b = LogicalId::new("b").unwrap();
        assert!(assert_reverse_order(&[&a, &b], &[b.clone(), a.clone()]).passed);
        assert!(!assert_reverse_order(&[&a, &b], &[a.clone(), b.clone()]).passed);
    }
}
