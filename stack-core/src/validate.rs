//! Per-declaration invariants.
//!
//! Each function checks one declaration in isolation. Checks that need a
//! second declaration (a balancer's pool, an experiment's role) live in the
//! graph builder, which has both at hand.

use std::collections::HashSet;
use std::time::Duration;

use stack_types::{
    ComputePool, ExecutionRole, ExperimentTemplate, LoadBalancerFront, LogicalId,
    NetworkBoundary, SafetyAlarm, SelectionMode, ValidationError,
};

/// Smallest subnet prefix length accepted.
pub const MIN_SUBNET_MASK: u8 = 16;
/// Largest subnet prefix length accepted.
pub const MAX_SUBNET_MASK: u8 = 28;
/// Upper bound for both health-check thresholds.
pub const MAX_HEALTH_THRESHOLD: u32 = 10;
/// Longest health-check interval.
pub const MAX_HEALTH_INTERVAL: Duration = Duration::from_secs(300);
/// Longest experiment description.
pub const MAX_DESCRIPTION_LEN: usize = 512;

/// Result type for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Check a network boundary.
pub fn network(id: &LogicalId, network: &NetworkBoundary) -> Result<()> {
    let fail = |reason: String| ValidationError::Network {
        id: id.clone(),
        reason,
    };
    if network.availability_zone_count == 0 {
        return Err(fail("at least one availability zone is required".into()));
    }
    if network.subnets.is_empty() {
        return Err(fail("at least one subnet group is required".into()));
    }
    let mut names = HashSet::new();
    for subnet in &network.subnets {
        if !names.insert(subnet.name.as_str()) {
            return Err(fail(format!("duplicate subnet group {}", subnet.name)));
        }
        if !(MIN_SUBNET_MASK..=MAX_SUBNET_MASK).contains(&subnet.cidr_mask) {
            return Err(fail(format!(
                "subnet {} mask /{} outside /{}../{}",
                subnet.name, subnet.cidr_mask, MIN_SUBNET_MASK, MAX_SUBNET_MASK
            )));
        }
        if subnet.cidr_mask < network.cidr.prefix() {
            return Err(fail(format!(
                "subnet {} /{} is larger than the network {}",
                subnet.name, subnet.cidr_mask, network.cidr
            )));
        }
    }
    if network.subnet_layout().is_none() {
        return Err(fail(format!(
            "{} subnets per zone across {} zones do not fit in {}",
            network.subnets.len(),
            network.availability_zone_count,
            network.cidr
        )));
    }
    Ok(())
}

/// Check a compute pool.
pub fn compute_pool(id: &LogicalId, pool: &ComputePool) -> Result<()> {
    if pool.min_size > pool.max_size {
        return Err(ValidationError::PoolBounds {
            id: id.clone(),
            min: pool.min_size,
            max: pool.max_size,
        });
    }
    let fail = |reason: String| ValidationError::ComputePool {
        id: id.clone(),
        reason,
    };
    if let Some(desired) = pool.desired_capacity {
        if desired < pool.min_size || desired > pool.max_size {
            return Err(fail(format!(
                "desired capacity {} outside {}..={}",
                desired, pool.min_size, pool.max_size
            )));
        }
    }
    if pool.boot_script.commands().is_empty() {
        return Err(fail("boot script is empty".into()));
    }
    if let Some(command) = pool.boot_script.non_idempotent_commands().first() {
        return Err(fail(format!(
            "boot script command is not safe to repeat: {}",
            command
        )));
    }
    let mut names = HashSet::new();
    for rule in &pool.scaling_rules {
        if !names.insert(rule.name.as_str()) {
            return Err(fail(format!("duplicate scaling rule {}", rule.name)));
        }
        if rule.target_requests_per_minute == 0 {
            return Err(fail(format!(
                "scaling rule {} targets zero requests per minute",
                rule.name
            )));
        }
    }
    Ok(())
}

/// Check a load balancer front and its health check.
pub fn load_balancer(id: &LogicalId, balancer: &LoadBalancerFront) -> Result<()> {
    let fail = |reason: String| ValidationError::LoadBalancer {
        id: id.clone(),
        reason,
    };
    if balancer.listener_port == 0 || balancer.target_port == 0 {
        return Err(fail("ports must be in 1..=65535".into()));
    }
    let hc = &balancer.health_check;
    if !hc.path.starts_with('/') {
        return Err(fail(format!("health check path {:?} must start with '/'", hc.path)));
    }
    for (name, value) in [
        ("healthy", hc.healthy_threshold),
        ("unhealthy", hc.unhealthy_threshold),
    ] {
        if !(1..=MAX_HEALTH_THRESHOLD).contains(&value) {
            return Err(fail(format!(
                "{} threshold {} outside 1..={}",
                name, value, MAX_HEALTH_THRESHOLD
            )));
        }
    }
    if hc.interval.is_zero() || hc.interval > MAX_HEALTH_INTERVAL {
        return Err(fail(format!(
            "health check interval {:?} outside (0s, {:?}]",
            hc.interval, MAX_HEALTH_INTERVAL
        )));
    }
    for rule in &balancer.ingress {
        if rule.cidr.parse::<stack_types::Cidr>().is_err() {
            return Err(fail(format!("ingress source {:?} is not a CIDR", rule.cidr)));
        }
        if rule.port != balancer.listener_port {
            return Err(fail(format!(
                "ingress port {} does not match listener port {}",
                rule.port, balancer.listener_port
            )));
        }
    }
    Ok(())
}

/// Whether `period` is a period the monitoring service evaluates.
///
/// High-resolution periods are 10 or 30 seconds; standard ones are whole
/// minutes.
pub fn is_valid_alarm_period(period: Duration) -> bool {
    if period.subsec_nanos() != 0 {
        return false;
    }
    match period.as_secs() {
        10 | 30 => true,
        secs => secs > 0 && secs % 60 == 0,
    }
}

/// Check a safety alarm.
pub fn alarm(id: &LogicalId, alarm: &SafetyAlarm) -> Result<()> {
    let fail = |reason: String| ValidationError::Alarm {
        id: id.clone(),
        reason,
    };
    if !is_valid_alarm_period(alarm.period) {
        return Err(fail(format!(
            "period {:?} must be 10s, 30s or a multiple of 60s",
            alarm.period
        )));
    }
    if alarm.evaluation_periods == 0 {
        return Err(fail("evaluation periods must be at least 1".into()));
    }
    if alarm.datapoints_to_alarm == 0 || alarm.datapoints_to_alarm > alarm.evaluation_periods {
        return Err(fail(format!(
            "datapoints to alarm {} outside 1..={}",
            alarm.datapoints_to_alarm, alarm.evaluation_periods
        )));
    }
    if !alarm.threshold.is_finite() {
        return Err(fail("threshold must be finite".into()));
    }
    if alarm.metric.namespace.is_empty() || alarm.metric.name.is_empty() {
        return Err(fail("metric namespace and name are required".into()));
    }
    Ok(())
}

/// Structural checks on an execution role.
///
/// Exact least privilege depends on the experiment that uses the role and
/// is checked when the experiment is added.
pub fn role(id: &LogicalId, role: &ExecutionRole) -> Result<()> {
    let fail = |reason: String| ValidationError::LeastPrivilege {
        id: id.clone(),
        reason,
    };
    if role.trusted_principal.as_str().is_empty() {
        return Err(fail("trusted principal is empty".into()));
    }
    if role.statements.is_empty() {
        return Err(fail("role grants nothing".into()));
    }
    if let Some(s) = role.statements.iter().find(|s| s.action.contains('*')) {
        return Err(fail(format!("wildcard action {}", s.action)));
    }
    Ok(())
}

/// Check an experiment template on its own.
pub fn experiment(id: &LogicalId, template: &ExperimentTemplate) -> Result<()> {
    let fail = |reason: String| ValidationError::Experiment {
        id: id.clone(),
        reason,
    };
    if template.description.trim().is_empty() {
        return Err(fail("description is required".into()));
    }
    if template.description.len() > MAX_DESCRIPTION_LEN {
        return Err(fail(format!(
            "description longer than {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    if template.stop_conditions.is_empty() {
        return Err(fail("at least one stop condition is required".into()));
    }
    if template.targets.is_empty() {
        return Err(fail("at least one target is required".into()));
    }
    if template.actions.is_empty() {
        return Err(fail("at least one action is required".into()));
    }
    for (name, target) in &template.targets {
        if target.state_filter.is_empty() {
            return Err(fail(format!("target {} has an empty state filter", name)));
        }
        match target.selection_mode {
            SelectionMode::All => {}
            SelectionMode::Count(0) => {
                return Err(fail(format!("target {} selects zero instances", name)))
            }
            SelectionMode::Count(_) => {}
            SelectionMode::Percent(p) if p == 0 || p > 100 => {
                return Err(fail(format!("target {} percent {} outside 1..=100", name, p)))
            }
            SelectionMode::Percent(_) => {}
        }
    }
    for (name, action) in &template.actions {
        if !template.targets.contains_key(&action.target_binding) {
            return Err(fail(format!(
                "action {} is bound to unknown target {}",
                name, action.target_binding
            )));
        }
    }
    Ok(())
}
