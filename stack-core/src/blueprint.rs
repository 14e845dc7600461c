//! The chaos test environment.
//!
//! A two-zone public network, a self-healing web pool behind an
//! internet-facing load balancer, and an experiment that terminates the
//! pool's running instances unless the terminating-instance alarm is
//! breaching.

use serde::Deserialize;
use std::time::Duration;

use stack_types::{
    BootScript, Cidr, ComputePool, Environment, ExecutionRole, ExperimentAction,
    ExperimentTemplate, Handle, HealthCheck, InstanceClass, InstanceShape, InstanceSize,
    LoadBalancerFront, NetworkBoundary, OutputValue, ResourcePattern, SafetyAlarm,
    ServicePrincipal, StopCondition, SubnetSpec, TargetSelector, ValidationError,
    TERMINATE_INSTANCES_ACTION,
};

use crate::graph::{StackBuilder, StackGraph};

/// Tag every pool instance carries and the experiment filters on.
pub const TARGET_TAG_KEY: &str = "chaos:target";

/// Name of the load balancer DNS output.
pub const ALB_DNS_OUTPUT: &str = "albDNS";

/// Name of the stop-condition alarm output.
pub const STOP_ALARM_OUTPUT: &str = "stopConditionAlarm";

/// Tunables of the chaos stack. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChaosStackProps {
    /// Network settings.
    #[serde(default)]
    pub network: NetworkProps,
    /// Compute pool settings.
    #[serde(default)]
    pub pool: PoolProps,
    /// Listener and health check settings.
    #[serde(default)]
    pub health_check: HealthCheckProps,
    /// Stop-condition alarm settings.
    #[serde(default)]
    pub alarm: AlarmProps,
    /// Experiment settings.
    #[serde(default)]
    pub experiment: ExperimentProps,
}

/// Network settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkProps {
    /// Network range (default: 10.0.0.0/16).
    #[serde(default = "default_cidr")]
    pub cidr: String,
    /// Availability zones (default: 2).
    #[serde(default = "default_availability_zones")]
    pub availability_zones: u8,
    /// Public subnet prefix length (default: 24).
    #[serde(default = "default_subnet_mask")]
    pub subnet_mask: u8,
}

/// Compute pool settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PoolProps {
    /// Minimum size (default: 2).
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    /// Maximum size (default: 5).
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    /// Requests per minute each instance should serve (default: 60).
    #[serde(default = "default_requests_per_minute")]
    pub target_requests_per_minute: u32,
    /// Status page heading (default: "CDK Chaos testing demo machine").
    #[serde(default = "default_banner")]
    pub banner: String,
    /// Value of the targeting tag (default: "true").
    #[serde(default = "default_target_tag_value")]
    pub target_tag_value: String,
}

/// Listener and health check settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthCheckProps {
    /// Listener and target port (default: 80).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Probe path (default: "/").
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds between probes (default: 30).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Successes before healthy (default: 5).
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,
    /// Failures before unhealthy (default: 2).
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

/// Stop-condition alarm settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlarmProps {
    /// Terminating instances that breach (default: 2).
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Period in seconds (default: 10).
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    /// Periods evaluated (default: 1).
    #[serde(default = "default_one")]
    pub evaluation_periods: u32,
    /// Breaching periods needed (default: 1).
    #[serde(default = "default_one")]
    pub datapoints_to_alarm: u32,
}

/// Experiment settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExperimentProps {
    /// Template description.
    #[serde(default = "default_description")]
    pub description: String,
}

// Default value functions
fn default_cidr() -> String {
    NetworkBoundary::DEFAULT_CIDR.to_string()
}

fn default_availability_zones() -> u8 {
    2
}

fn default_subnet_mask() -> u8 {
    24
}

fn default_min_size() -> u32 {
    2
}

fn default_max_size() -> u32 {
    5
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_banner() -> String {
    "CDK Chaos testing demo machine".to_string()
}

fn default_target_tag_value() -> String {
    "true".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_path() -> String {
    "/".to_string()
}

fn default_interval_secs() -> u64 {
    30
}

fn default_healthy_threshold() -> u32 {
    5
}

fn default_unhealthy_threshold() -> u32 {
    2
}

fn default_threshold() -> f64 {
    2.0
}

fn default_period_secs() -> u64 {
    10
}

fn default_one() -> u32 {
    1
}

fn default_description() -> String {
    "Terminate running web instances while the pool heals".to_string()
}

impl Default for NetworkProps {
    fn default() -> Self {
        Self {
            cidr: default_cidr(),
            availability_zones: default_availability_zones(),
            subnet_mask: default_subnet_mask(),
        }
    }
}

impl Default for PoolProps {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
            target_requests_per_minute: default_requests_per_minute(),
            banner: default_banner(),
            target_tag_value: default_target_tag_value(),
        }
    }
}

impl Default for HealthCheckProps {
    fn default() -> Self {
        Self {
            port: default_port(),
            path: default_path(),
            interval_secs: default_interval_secs(),
            healthy_threshold: default_healthy_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

impl Default for AlarmProps {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            period_secs: default_period_secs(),
            evaluation_periods: default_one(),
            datapoints_to_alarm: default_one(),
        }
    }
}

impl Default for ExperimentProps {
    fn default() -> Self {
        Self {
            description: default_description(),
        }
    }
}

/// The built stack and handles to each of its resources.
#[derive(Debug, Clone)]
pub struct ChaosStack {
    /// The validated graph.
    pub graph: StackGraph,
    /// `chaosVPC`
    pub network: Handle<NetworkBoundary>,
    /// `ASG`
    pub pool: Handle<ComputePool>,
    /// `chaosLB`
    pub balancer: Handle<LoadBalancerFront>,
    /// `chaosStopAlarm`
    pub alarm: Handle<SafetyAlarm>,
    /// `chaosFisRole`
    pub role: Handle<ExecutionRole>,
    /// `chaosExperiment`
    pub experiment: Handle<ExperimentTemplate>,
}

/// Declare and build the chaos stack.
pub fn chaos_stack(
    env: Environment,
    props: &ChaosStackProps,
) -> Result<ChaosStack, ValidationError> {
    let mut stack = StackBuilder::new(env.clone());

    let cidr: Cidr = props.network.cidr.parse()?;
    let network = stack.add_network(
        "chaosVPC",
        NetworkBoundary::new(props.network.availability_zones)
            .with_cidr(cidr)
            .with_subnet(SubnetSpec::public("chaosSubnet", props.network.subnet_mask)),
    )?;

    let pool = stack.add_compute_pool(
        "ASG",
        ComputePool::new(
            &network,
            InstanceShape::of(InstanceClass::T3, InstanceSize::Micro),
            BootScript::web_server(&props.pool.banner),
        )
        .capacity(props.pool.min_size, props.pool.max_size)
        .scale_on_request_count("scalePerRequest", props.pool.target_requests_per_minute)
        .tag(TARGET_TAG_KEY, &props.pool.target_tag_value),
    )?;

    let hc = &props.health_check;
    let balancer = stack.add_load_balancer(
        "chaosLB",
        LoadBalancerFront::new(&network, &pool, hc.port)
            .health_check(HealthCheck {
                path: hc.path.clone(),
                interval: Duration::from_secs(hc.interval_secs),
                healthy_threshold: hc.healthy_threshold,
                unhealthy_threshold: hc.unhealthy_threshold,
            })
            .allow_listener_from_anywhere("Open to the world"),
    )?;

    let alarm = stack.add_alarm(
        "chaosStopAlarm",
        SafetyAlarm::terminating_instances(
            &pool,
            props.alarm.threshold,
            Duration::from_secs(props.alarm.period_secs),
        )
        .evaluate(props.alarm.datapoints_to_alarm, props.alarm.evaluation_periods),
    )?;

    let role = stack.add_role(
        "chaosFisRole",
        ExecutionRole::assumable_by(ServicePrincipal::fis())
            .allow(TERMINATE_INSTANCES_ACTION, ResourcePattern::instances(&env)),
    )?;

    let experiment = stack.add_experiment(
        "chaosExperiment",
        ExperimentTemplate::new(&props.experiment.description, &role)
            .stop_when(StopCondition::alarm(&alarm))
            .target(
                "chaosTargets",
                TargetSelector::running_instances(
                    &pool,
                    TARGET_TAG_KEY,
                    &props.pool.target_tag_value,
                ),
            )
            .action("terminateInstances", ExperimentAction::terminate("chaosTargets"))
            .tag("Name", "chaos-terminate-instances"),
    )?;

    stack.add_output(ALB_DNS_OUTPUT, OutputValue::dns_name(&balancer))?;
    stack.add_output(STOP_ALARM_OUTPUT, OutputValue::arn(&alarm))?;

    Ok(ChaosStack {
        graph: stack.build()?,
        network,
        pool,
        balancer,
        alarm,
        role,
        experiment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stack_types::{ComparisonOperator, LogicalId, MissingDataPolicy, SelectionMode};

    fn env() -> Environment {
        Environment::new("678949171549", "eu-north-1").unwrap()
    }

    #[test]
    fn default_stack_matches_reference_environment() {
        let stack = chaos_stack(env(), &ChaosStackProps::default()).unwrap();
        let g = &stack.graph;

        let net = g.get(&stack.network).unwrap();
        assert_eq!(net.availability_zone_count, 2);
        assert_eq!(net.subnets[0].name, "chaosSubnet");
        assert_eq!(net.subnets[0].cidr_mask, 24);

        let pool = g.get(&stack.pool).unwrap();
        assert_eq!((pool.min_size, pool.max_size), (2, 5));
        assert_eq!(pool.shape.to_string(), "t3.micro");
        assert_eq!(pool.scaling_rules[0].name, "scalePerRequest");
        assert_eq!(pool.scaling_rules[0].target_requests_per_minute, 60);
        assert!(pool.boot_script.starts_service("httpd"));

        let lb = g.get(&stack.balancer).unwrap();
        assert!(lb.internet_facing);
        assert_eq!((lb.listener_port, lb.target_port), (80, 80));
        assert_eq!(lb.health_check.path, "/");
        assert_eq!(lb.health_check.healthy_threshold, 5);
        assert_eq!(lb.health_check.unhealthy_threshold, 2);
        assert_eq!(lb.health_check.interval, Duration::from_secs(30));
        assert_eq!(lb.ingress[0].cidr, "0.0.0.0/0");
        assert_eq!(lb.ingress[0].description, "Open to the world");
    }

    #[test]
    fn stop_alarm_defaults() {
        let stack = chaos_stack(env(), &ChaosStackProps::default()).unwrap();
        let alarm = stack.graph.get(&stack.alarm).unwrap();
        assert_eq!(alarm.threshold, 2.0);
        assert_eq!(alarm.period, Duration::from_secs(10));
        assert_eq!(alarm.evaluation_periods, 1);
        assert_eq!(alarm.datapoints_to_alarm, 1);
        assert_eq!(alarm.comparison, ComparisonOperator::GreaterThanOrEqualToThreshold);
        assert_eq!(alarm.missing_data, MissingDataPolicy::NotBreaching);
    }

    #[test]
    fn experiment_targets_all_running_tagged() {
        let stack = chaos_stack(env(), &ChaosStackProps::default()).unwrap();
        let template = stack.graph.get(&stack.experiment).unwrap();
        let target = &template.targets["chaosTargets"];
        assert_eq!(target.selection_mode, SelectionMode::All);
        assert_eq!(target.resource_tags[TARGET_TAG_KEY], "true");
        assert!(template.actions["terminateInstances"].parameters.is_empty());
    }

    #[test]
    fn outputs_are_named() {
        let stack = chaos_stack(env(), &ChaosStackProps::default()).unwrap();
        let outputs = stack.graph.outputs();
        assert_eq!(outputs[ALB_DNS_OUTPUT].resource.id.as_str(), "chaosLB");
        assert_eq!(outputs[STOP_ALARM_OUTPUT].resource.id.as_str(), "chaosStopAlarm");
    }

    #[test]
    fn role_and_network_apply_first() {
        let stack = chaos_stack(env(), &ChaosStackProps::default()).unwrap();
        let first: Vec<&str> = stack.graph.waves()[0].iter().map(|i| i.as_str()).collect();
        assert_eq!(first, vec!["chaosVPC", "chaosFisRole"]);
        assert_eq!(
            stack.graph.dependencies_of(&LogicalId::new("chaosExperiment").unwrap()).len(),
            3
        );
    }

    #[test]
    fn inverted_pool_bounds_rejected() {
        let mut props = ChaosStackProps::default();
        props.pool.min_size = 6;
        assert!(matches!(
            chaos_stack(env(), &props),
            Err(ValidationError::PoolBounds { min: 6, max: 5, .. })
        ));
    }

    #[test]
    fn props_deserialize_with_defaults() {
        let props: ChaosStackProps = serde_json::from_str(r#"{"pool": {"max_size": 8}}"#).unwrap();
        assert_eq!(props.pool.max_size, 8);
        assert_eq!(props.pool.min_size, 2);
        assert_eq!(props.health_check, HealthCheckProps::default());
    }
}
