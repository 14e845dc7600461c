//! In-process simulated cloud for dry runs and testing.
//!
//! Models the parts of the control and data plane an experiment touches:
//! instances boot and shut down over time, pools heal back to their desired
//! size, the load balancer probes its targets, and alarms evaluate one
//! aggregated datapoint per period. Time is read from `tokio::time`, so
//! tests with a paused clock advance the simulation by sleeping.

use async_trait::async_trait;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use stack_core::scaling::desired_capacity_for;
use stack_core::{AlarmEvaluator, InstanceSnapshot};
use stack_types::{
    AlarmState, Arn, Declaration, Environment, ExecutionRole, HealthCheck, InstanceState,
    LoadBalancerFront, PhysicalId, ResourceKind, ScalingRule, Statistic,
    TERMINATE_INSTANCES_ACTION, TERMINATING_INSTANCES_METRIC,
};

use super::{
    CloudProvider, CreateRequest, ListenerDescription, LiveResource, LoadBalancerDescription,
    ProviderError, ResourceRecord, Session, TargetHealth, TargetHealthState,
};
use crate::config::SimulationConfig;

/// Tag a pool stamps on every instance it launches.
const GROUP_NAME_TAG: &str = "aws:autoscaling:groupName";

/// Simulated cloud for testing.
///
/// Clones share the same state, so a test can keep a handle for hooks
/// while the engine owns another.
pub struct SimulatedCloud {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    env: Environment,
    config: SimulationConfig,
    resources: HashMap<PhysicalId, SimResource>,
    pools: BTreeMap<PhysicalId, SimPool>,
    instances: BTreeMap<PhysicalId, SimInstance>,
    /// Terminated instances, in the order they terminated.
    terminated: VecDeque<PhysicalId>,
    balancers: BTreeMap<PhysicalId, SimBalancer>,
    alarms: BTreeMap<PhysicalId, SimAlarm>,
    roles: HashMap<Arn, ExecutionRole>,
    launches: u64,
    mutations: u64,
    fail_next_create: Option<String>,
    fail_next_delete: Option<String>,
}

struct SimResource {
    record: ResourceRecord,
    fingerprint: String,
    references: Vec<PhysicalId>,
}

struct SimPool {
    min_size: u32,
    max_size: u32,
    desired: u32,
    rules: Vec<ScalingRule>,
    tags: BTreeMap<String, String>,
    group_metrics: bool,
}

struct SimInstance {
    pool: Option<PhysicalId>,
    state: InstanceState,
    tags: BTreeMap<String, String>,
    arn: Arn,
    launch_seq: u64,
    deadline: Option<Instant>,
    serving: bool,
}

impl SimInstance {
    fn is_live(&self) -> bool {
        matches!(self.state, InstanceState::Pending | InstanceState::Running)
    }
}

struct SimBalancer {
    pool: PhysicalId,
    declaration: LoadBalancerFront,
    dns_name: String,
    next_check: Instant,
    targets: BTreeMap<PhysicalId, Probe>,
}

struct Probe {
    state: TargetHealthState,
    successes: u32,
    failures: u32,
}

impl Probe {
    fn new() -> Self {
        Self {
            state: TargetHealthState::Initial,
            successes: 0,
            failures: 0,
        }
    }

    fn record(&mut self, ok: bool, check: &HealthCheck) {
        if self.state == TargetHealthState::Draining {
            return;
        }
        if ok {
            self.successes += 1;
            self.failures = 0;
            if self.successes >= check.healthy_threshold {
                self.state = TargetHealthState::Healthy;
            }
        } else {
            self.failures += 1;
            self.successes = 0;
            if self.failures >= check.unhealthy_threshold {
                self.state = TargetHealthState::Unhealthy;
            }
        }
    }
}

struct SimAlarm {
    pool: PhysicalId,
    metric: String,
    statistic: Statistic,
    period: Duration,
    evaluator: AlarmEvaluator,
    samples: Vec<f64>,
    next_eval: Instant,
}

fn physical_name(stack: &str, logical: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}-{}", stack, logical, &suffix[..12])
}

impl Inner {
    fn new(env: Environment, config: SimulationConfig) -> Self {
        Self {
            env,
            config,
            resources: HashMap::new(),
            pools: BTreeMap::new(),
            instances: BTreeMap::new(),
            terminated: VecDeque::new(),
            balancers: BTreeMap::new(),
            alarms: BTreeMap::new(),
            roles: HashMap::new(),
            launches: 0,
            mutations: 0,
            fail_next_create: None,
            fail_next_delete: None,
        }
    }

    /// Process every scheduled event up to now.
    fn settle(&mut self) {
        let now = Instant::now();
        while let Some(at) = self.next_event().filter(|at| *at <= now) {
            self.advance(at);
        }
    }

    fn next_event(&self) -> Option<Instant> {
        let lifecycle = self.instances.values().filter_map(|i| i.deadline);
        let checks = self.balancers.values().map(|b| b.next_check);
        let periods = self.alarms.values().map(|a| a.next_eval);
        lifecycle.chain(checks).chain(periods).min()
    }

    fn advance(&mut self, at: Instant) {
        for (id, instance) in self.instances.iter_mut() {
            if !instance.deadline.is_some_and(|d| d <= at) {
                continue;
            }
            instance.deadline = None;
            instance.state = match instance.state {
                InstanceState::Pending => InstanceState::Running,
                InstanceState::ShuttingDown => {
                    self.terminated.push_back(id.clone());
                    InstanceState::Terminated
                }
                other => other,
            };
        }
        self.heal(at);
        self.sync_targets();
        self.sample_gauges();
        self.run_health_checks(at);
        self.evaluate_alarms(at);
        self.prune_terminated();
    }

    /// Forget the oldest terminated instances beyond the retention limit.
    fn prune_terminated(&mut self) {
        let excess = self
            .terminated
            .len()
            .saturating_sub(self.config.terminated_retention);
        for id in self.terminated.drain(..excess) {
            self.instances.remove(&id);
        }
        if excess > 0 {
            tracing::debug!("pruned {} terminated instances", excess);
        }
    }

    /// Bring every pool back to its desired size.
    fn heal(&mut self, at: Instant) {
        let mut plan: Vec<(PhysicalId, i64)> = Vec::new();
        for (id, pool) in &self.pools {
            let live = self
                .instances
                .values()
                .filter(|i| i.pool.as_ref() == Some(id) && i.is_live())
                .count();
            let delta = i64::from(pool.desired) - i64::try_from(live).unwrap_or(i64::MAX);
            if delta != 0 {
                plan.push((id.clone(), delta));
            }
        }

        for (pool, delta) in plan {
            if delta > 0 {
                for _ in 0..delta {
                    self.launch(&pool, at);
                }
            } else {
                // Scale in newest first.
                let mut live: Vec<(u64, PhysicalId)> = self
                    .instances
                    .iter()
                    .filter(|(_, i)| i.pool.as_ref() == Some(&pool) && i.is_live())
                    .map(|(id, i)| (i.launch_seq, id.clone()))
                    .collect();
                live.sort();
                let excess = usize::try_from(delta.unsigned_abs()).unwrap_or(usize::MAX);
                for (_, id) in live.into_iter().rev().take(excess) {
                    self.begin_termination(&id, at);
                }
            }
        }
    }

    fn launch(&mut self, pool_id: &PhysicalId, at: Instant) {
        let Some(pool) = self.pools.get(pool_id) else {
            return;
        };
        let id = PhysicalId::generate("i");
        let mut tags = pool.tags.clone();
        tags.insert(GROUP_NAME_TAG.to_string(), pool_id.to_string());
        let arn = Arn::new(
            "ec2",
            &self.env.region,
            &self.env.account,
            &format!("instance/{}", id),
        );
        self.launches += 1;
        tracing::debug!("pool {} launched {}", pool_id, id);
        self.instances.insert(
            id,
            SimInstance {
                pool: Some(pool_id.clone()),
                state: InstanceState::Pending,
                tags,
                arn,
                launch_seq: self.launches,
                deadline: Some(at + self.config.boot_time()),
                serving: true,
            },
        );
    }

    fn begin_termination(&mut self, id: &PhysicalId, at: Instant) -> bool {
        let termination = self.config.termination_time();
        match self.instances.get_mut(id) {
            Some(instance) if instance.is_live() => {
                instance.state = InstanceState::ShuttingDown;
                instance.deadline = Some(at + termination);
                true
            }
            _ => false,
        }
    }

    /// Register running pool members, drain leaving ones, drop gone ones.
    fn sync_targets(&mut self) {
        let instances = &self.instances;
        for balancer in self.balancers.values_mut() {
            balancer.targets.retain(|id, _| {
                instances
                    .get(id)
                    .is_some_and(|i| i.state != InstanceState::Terminated)
            });
            for (id, instance) in instances {
                if instance.pool.as_ref() != Some(&balancer.pool) {
                    continue;
                }
                match instance.state {
                    InstanceState::Running => {
                        balancer.targets.entry(id.clone()).or_insert_with(Probe::new);
                    }
                    InstanceState::ShuttingDown => {
                        if let Some(probe) = balancer.targets.get_mut(id) {
                            probe.state = TargetHealthState::Draining;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Terminating-instance count of every pool that publishes group metrics.
    fn gauges(&self) -> HashMap<PhysicalId, f64> {
        self.pools
            .iter()
            .filter(|(_, p)| p.group_metrics)
            .map(|(id, _)| {
                let terminating = self
                    .instances
                    .values()
                    .filter(|i| {
                        i.pool.as_ref() == Some(id) && i.state == InstanceState::ShuttingDown
                    })
                    .count();
                (id.clone(), terminating as f64)
            })
            .collect()
    }

    fn sample_gauges(&mut self) {
        let gauges = self.gauges();
        for alarm in self.alarms.values_mut() {
            if alarm.metric != TERMINATING_INSTANCES_METRIC {
                continue;
            }
            if let Some(value) = gauges.get(&alarm.pool) {
                alarm.samples.push(*value);
            }
        }
    }

    fn run_health_checks(&mut self, at: Instant) {
        let instances = &self.instances;
        for balancer in self.balancers.values_mut() {
            if balancer.next_check > at {
                continue;
            }
            let check = &balancer.declaration.health_check;
            for (id, probe) in balancer.targets.iter_mut() {
                let ok = instances
                    .get(id)
                    .is_some_and(|i| i.state == InstanceState::Running && i.serving);
                probe.record(ok, check);
            }
            balancer.next_check = at + check.interval.max(Duration::from_secs(1));
        }
    }

    fn evaluate_alarms(&mut self, at: Instant) {
        let gauges = self.gauges();
        for (id, alarm) in self.alarms.iter_mut() {
            if alarm.next_eval > at {
                continue;
            }
            let datapoint = alarm.statistic.aggregate(&alarm.samples);
            if let Some(transition) = alarm.evaluator.observe(datapoint) {
                tracing::info!(
                    "alarm {} {} -> {} (datapoint {:?})",
                    id,
                    transition.from,
                    transition.to,
                    datapoint
                );
            }
            alarm.samples.clear();
            if alarm.metric == TERMINATING_INSTANCES_METRIC {
                if let Some(value) = gauges.get(&alarm.pool) {
                    alarm.samples.push(*value);
                }
            }
            alarm.next_eval = at + alarm.period.max(Duration::from_secs(1));
        }
    }

    fn record(&self, kind: ResourceKind, physical_id: PhysicalId, arn: Arn) -> ResourceRecord {
        ResourceRecord {
            kind,
            physical_id,
            arn,
            dns_name: None,
        }
    }

    fn create(&mut self, request: CreateRequest) -> Result<ResourceRecord, ProviderError> {
        if let Some(reason) = self.fail_next_create.take() {
            return Err(ProviderError::Injected(reason));
        }

        let mut references = Vec::new();
        for reference in request.declaration.references() {
            let record = request.resolve(&reference.id)?;
            if !self.resources.contains_key(&record.physical_id) {
                return Err(ProviderError::UnresolvedReference {
                    from: request.logical_id.clone(),
                    to: reference.id,
                });
            }
            references.push(record.physical_id.clone());
        }

        let now = Instant::now();
        let region = self.env.region.clone();
        let account = self.env.account.clone();
        let name = physical_name(&request.stack, request.logical_id.as_str());

        let record = match &request.declaration {
            Declaration::NetworkBoundary(network) => {
                if network.availability_zone_count > self.config.region_zones {
                    return Err(ProviderError::InvalidRequest(format!(
                        "{} requests {} availability zones, {} has {}",
                        request.logical_id,
                        network.availability_zone_count,
                        region,
                        self.config.region_zones
                    )));
                }
                let id = PhysicalId::generate("vpc");
                let arn = Arn::new("ec2", &region, &account, &format!("vpc/{}", id));
                self.record(ResourceKind::NetworkBoundary, id, arn)
            }
            Declaration::ComputePool(pool) => {
                let id = PhysicalId::new(name.clone());
                let arn = Arn::new(
                    "autoscaling",
                    &region,
                    &account,
                    &format!(
                        "autoScalingGroup:{}:autoScalingGroupName/{}",
                        uuid::Uuid::new_v4(),
                        name
                    ),
                );
                self.pools.insert(
                    id.clone(),
                    SimPool {
                        min_size: pool.min_size,
                        max_size: pool.max_size,
                        desired: pool.initial_size(),
                        rules: pool.scaling_rules.clone(),
                        tags: pool.tags.clone(),
                        group_metrics: pool.group_metrics,
                    },
                );
                self.heal(now);
                self.record(ResourceKind::ComputePool, id, arn)
            }
            Declaration::LoadBalancerFront(balancer) => {
                let pool = request.resolve(balancer.target.id())?.physical_id.clone();
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                let id = PhysicalId::new(name.clone());
                let arn = Arn::new(
                    "elasticloadbalancing",
                    &region,
                    &account,
                    &format!("loadbalancer/app/{}/{}", name, &suffix[..16]),
                );
                let dns_name = format!(
                    "{}-{}.{}.elb.amazonaws.com",
                    name,
                    rand::thread_rng().gen_range(100_000_000u32..1_000_000_000),
                    region
                );
                self.balancers.insert(
                    id.clone(),
                    SimBalancer {
                        pool,
                        declaration: balancer.clone(),
                        dns_name: dns_name.clone(),
                        next_check: now + balancer.health_check.interval,
                        targets: BTreeMap::new(),
                    },
                );
                self.sync_targets();
                ResourceRecord {
                    dns_name: Some(dns_name),
                    ..self.record(ResourceKind::LoadBalancerFront, id, arn)
                }
            }
            Declaration::SafetyAlarm(alarm) => {
                let pool = request.resolve(alarm.metric.pool.id())?.physical_id.clone();
                let id = PhysicalId::new(name.clone());
                let arn = Arn::new("cloudwatch", &region, &account, &format!("alarm:{}", name));
                self.alarms.insert(
                    id.clone(),
                    SimAlarm {
                        pool,
                        metric: alarm.metric.name.clone(),
                        statistic: alarm.statistic,
                        period: alarm.period,
                        evaluator: AlarmEvaluator::new(alarm),
                        samples: Vec::new(),
                        next_eval: now + alarm.period,
                    },
                );
                self.sample_gauges();
                self.record(ResourceKind::SafetyAlarm, id, arn)
            }
            Declaration::ExecutionRole(role) => {
                let id = PhysicalId::new(name.clone());
                let arn = Arn::new("iam", "", &account, &format!("role/{}", name));
                self.roles.insert(arn.clone(), role.clone());
                self.record(ResourceKind::ExecutionRole, id, arn)
            }
            Declaration::ExperimentTemplate(_) => {
                let suffix = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
                let id = PhysicalId::new(format!("EXT{}", &suffix[..15]));
                let arn = Arn::new(
                    "fis",
                    &region,
                    &account,
                    &format!("experiment-template/{}", id),
                );
                self.record(ResourceKind::ExperimentTemplate, id, arn)
            }
        };

        tracing::info!(
            "created {} {} as {}",
            record.kind,
            request.logical_id,
            record.physical_id
        );
        self.resources.insert(
            record.physical_id.clone(),
            SimResource {
                record: record.clone(),
                fingerprint: request.fingerprint,
                references,
            },
        );
        self.mutations += 1;
        Ok(record)
    }

    fn lookup(&self, kind: ResourceKind, id: &PhysicalId) -> Result<&SimResource, ProviderError> {
        self.resources
            .get(id)
            .filter(|r| r.record.kind == kind)
            .ok_or_else(|| ProviderError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    fn delete(&mut self, kind: ResourceKind, id: &PhysicalId) -> Result<(), ProviderError> {
        let arn = self.lookup(kind, id)?.record.arn.clone();

        if kind == ResourceKind::NetworkBoundary {
            let dependents: Vec<PhysicalId> = self
                .resources
                .iter()
                .filter(|(_, r)| r.references.contains(id))
                .map(|(pid, _)| pid.clone())
                .collect();
            if !dependents.is_empty() {
                return Err(ProviderError::DependencyViolation {
                    id: id.clone(),
                    dependents,
                });
            }
        }

        match kind {
            ResourceKind::ComputePool => {
                self.pools.remove(id);
                for (instance_id, instance) in self.instances.iter_mut() {
                    if instance.pool.as_ref() == Some(id)
                        && instance.state != InstanceState::Terminated
                    {
                        instance.state = InstanceState::Terminated;
                        instance.deadline = None;
                        self.terminated.push_back(instance_id.clone());
                    }
                }
                self.sync_targets();
                self.prune_terminated();
            }
            ResourceKind::LoadBalancerFront => {
                self.balancers.remove(id);
            }
            ResourceKind::SafetyAlarm => {
                self.alarms.remove(id);
            }
            ResourceKind::ExecutionRole => {
                self.roles.remove(&arn);
            }
            ResourceKind::NetworkBoundary | ResourceKind::ExperimentTemplate => {}
        }

        self.resources.remove(id);
        self.mutations += 1;
        tracing::info!("deleted {} {}", kind, id);
        Ok(())
    }

    fn terminate(
        &mut self,
        session: &Session,
        ids: &[PhysicalId],
    ) -> Result<Vec<PhysicalId>, ProviderError> {
        let role = self
            .roles
            .get(&session.role_arn)
            .ok_or_else(|| ProviderError::AccessDenied {
                action: "sts:AssumeRole".into(),
                resource: session.role_arn.to_string(),
            })?;

        // Authorize the whole batch before touching anything.
        for id in ids {
            let instance = self
                .instances
                .get(id)
                .ok_or_else(|| ProviderError::InstanceNotFound(id.clone()))?;
            if !role.permits(TERMINATE_INSTANCES_ACTION, &instance.arn) {
                return Err(ProviderError::AccessDenied {
                    action: TERMINATE_INSTANCES_ACTION.into(),
                    resource: instance.arn.to_string(),
                });
            }
        }

        let now = Instant::now();
        let affected: Vec<PhysicalId> = ids
            .iter()
            .filter(|id| self.begin_termination(id, now))
            .cloned()
            .collect();
        self.mutations += 1;
        self.sync_targets();
        self.sample_gauges();
        self.heal(now);
        Ok(affected)
    }
}

impl SimulatedCloud {
    /// Create a simulated cloud for `env` with default timings.
    pub fn new(env: Environment) -> Self {
        Self::with_config(env, SimulationConfig::default())
    }

    /// Create a simulated cloud with explicit timings.
    pub fn with_config(env: Environment, config: SimulationConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new(env, config))),
        }
    }

    /// Make the next `create()` fail.
    pub async fn fail_next_create(&self, reason: &str) {
        self.inner.lock().await.fail_next_create = Some(reason.to_string());
    }

    /// Make the next `delete()` fail.
    pub async fn fail_next_delete(&self, reason: &str) {
        self.inner.lock().await.fail_next_delete = Some(reason.to_string());
    }

    /// Change a resource outside the engine. Returns false if it does not exist.
    pub async fn tamper(&self, id: &PhysicalId) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.resources.get_mut(id) {
            Some(resource) => {
                resource.fingerprint = format!("tampered:{}", resource.fingerprint);
                true
            }
            None => false,
        }
    }

    /// Delete a resource outside the engine, ignoring dependents.
    pub async fn delete_out_of_band(&self, id: &PhysicalId) -> bool {
        let mut inner = self.inner.lock().await;
        inner.settle();
        let Some(kind) = inner.resources.get(id).map(|r| r.record.kind) else {
            return false;
        };
        for resource in inner.resources.values_mut() {
            resource.references.retain(|r| r != id);
        }
        inner.delete(kind, id).is_ok()
    }

    /// Remove every permission from a role.
    pub async fn revoke_role_permissions(&self, role: &Arn) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.roles.get_mut(role) {
            Some(role) => {
                role.statements.clear();
                true
            }
            None => false,
        }
    }

    /// Make an instance pass or fail load balancer health checks.
    pub async fn set_instance_serving(&self, id: &PhysicalId, serving: bool) -> bool {
        let mut inner = self.inner.lock().await;
        inner.settle();
        match inner.instances.get_mut(id) {
            Some(instance) => {
                instance.serving = serving;
                true
            }
            None => false,
        }
    }

    /// Set the request rate a pool sees and apply its scaling rules.
    ///
    /// Returns the new desired size.
    pub async fn set_request_rate(
        &self,
        pool: &PhysicalId,
        requests_per_minute: u64,
    ) -> Option<u32> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        let sim = inner.pools.get_mut(pool)?;
        if let Some(desired) =
            desired_capacity_for(&sim.rules, requests_per_minute, sim.min_size, sim.max_size)
        {
            sim.desired = desired;
        }
        let desired = sim.desired;
        inner.heal(Instant::now());
        inner.sync_targets();
        inner.sample_gauges();
        Some(desired)
    }

    /// Launch a running instance that belongs to no pool.
    pub async fn launch_unmanaged_instance(&self, tags: BTreeMap<String, String>) -> PhysicalId {
        let mut inner = self.inner.lock().await;
        let id = PhysicalId::generate("i");
        let arn = Arn::new(
            "ec2",
            &inner.env.region,
            &inner.env.account,
            &format!("instance/{}", id),
        );
        inner.launches += 1;
        let launch_seq = inner.launches;
        inner.instances.insert(
            id.clone(),
            SimInstance {
                pool: None,
                state: InstanceState::Running,
                tags,
                arn,
                launch_seq,
                deadline: None,
                serving: true,
            },
        );
        id
    }

    /// Lifecycle state of any instance, pooled or not.
    ///
    /// Terminated instances are reported until they age out of the
    /// retention limit.
    pub async fn instance_state(&self, id: &PhysicalId) -> Option<InstanceState> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        inner.instances.get(id).map(|i| i.state)
    }

    /// Desired size of a pool.
    pub async fn desired_capacity(&self, pool: &PhysicalId) -> Option<u32> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        inner.pools.get(pool).map(|p| p.desired)
    }

    /// Number of create, delete and terminate calls that changed something.
    pub async fn mutation_count(&self) -> u64 {
        self.inner.lock().await.mutations
    }
}

impl Clone for SimulatedCloud {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl CloudProvider for SimulatedCloud {
    async fn create(&self, request: CreateRequest) -> Result<ResourceRecord, ProviderError> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        inner.create(request)
    }

    async fn delete(&self, kind: ResourceKind, id: &PhysicalId) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        if let Some(reason) = inner.fail_next_delete.take() {
            return Err(ProviderError::Injected(reason));
        }
        inner.delete(kind, id)
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        id: &PhysicalId,
    ) -> Result<Option<LiveResource>, ProviderError> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        Ok(inner
            .resources
            .get(id)
            .filter(|r| r.record.kind == kind)
            .map(|r| LiveResource {
                record: r.record.clone(),
                fingerprint: r.fingerprint.clone(),
            }))
    }

    async fn assume_role(&self, role: &Arn, principal: &str) -> Result<Session, ProviderError> {
        let inner = self.inner.lock().await;
        let denied = || ProviderError::AccessDenied {
            action: "sts:AssumeRole".into(),
            resource: role.to_string(),
        };
        let execution_role = inner.roles.get(role).ok_or_else(denied)?;
        if execution_role.trusted_principal.as_str() != principal {
            return Err(denied());
        }
        Ok(Session {
            role_arn: role.clone(),
            principal: principal.to_string(),
        })
    }

    async fn describe_instances(
        &self,
        pool: &PhysicalId,
    ) -> Result<Vec<InstanceSnapshot>, ProviderError> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        if !inner.pools.contains_key(pool) {
            return Err(ProviderError::NotFound {
                kind: ResourceKind::ComputePool,
                id: pool.to_string(),
            });
        }
        Ok(inner
            .instances
            .iter()
            .filter(|(_, i)| i.pool.as_ref() == Some(pool) && i.state != InstanceState::Terminated)
            .map(|(id, i)| InstanceSnapshot {
                id: id.clone(),
                pool: i.pool.clone(),
                state: i.state,
                tags: i.tags.clone(),
            })
            .collect())
    }

    async fn terminate_instances(
        &self,
        session: &Session,
        instances: &[PhysicalId],
    ) -> Result<Vec<PhysicalId>, ProviderError> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        inner.terminate(session, instances)
    }

    async fn describe_alarm(&self, alarm: &PhysicalId) -> Result<AlarmState, ProviderError> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        inner
            .alarms
            .get(alarm)
            .map(|a| a.evaluator.state())
            .ok_or_else(|| ProviderError::NotFound {
                kind: ResourceKind::SafetyAlarm,
                id: alarm.to_string(),
            })
    }

    async fn describe_target_health(
        &self,
        balancer: &PhysicalId,
    ) -> Result<Vec<TargetHealth>, ProviderError> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        let sim = inner
            .balancers
            .get(balancer)
            .ok_or_else(|| ProviderError::NotFound {
                kind: ResourceKind::LoadBalancerFront,
                id: balancer.to_string(),
            })?;
        Ok(sim
            .targets
            .iter()
            .map(|(id, probe)| TargetHealth {
                instance: id.clone(),
                state: probe.state,
            })
            .collect())
    }

    async fn describe_load_balancer(
        &self,
        balancer: &PhysicalId,
    ) -> Result<LoadBalancerDescription, ProviderError> {
        let inner = self.inner.lock().await;
        let sim = inner
            .balancers
            .get(balancer)
            .ok_or_else(|| ProviderError::NotFound {
                kind: ResourceKind::LoadBalancerFront,
                id: balancer.to_string(),
            })?;
        let declaration = &sim.declaration;
        Ok(LoadBalancerDescription {
            dns_name: sim.dns_name.clone(),
            scheme: if declaration.internet_facing {
                "internet-facing".into()
            } else {
                "internal".into()
            },
            listeners: vec![ListenerDescription {
                port: declaration.listener_port,
                protocol: "HTTP".into(),
                target_pool: sim.pool.clone(),
                target_port: declaration.target_port,
            }],
        })
    }

    async fn put_metric(
        &self,
        pool: &PhysicalId,
        metric: &str,
        value: f64,
    ) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock().await;
        inner.settle();
        if !inner.pools.contains_key(pool) {
            return Err(ProviderError::NotFound {
                kind: ResourceKind::ComputePool,
                id: pool.to_string(),
            });
        }
        for alarm in inner.alarms.values_mut() {
            if &alarm.pool == pool && alarm.metric == metric {
                alarm.samples.push(value);
            }
        }
        Ok(())
    }
}
