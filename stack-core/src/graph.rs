//! Stack graph construction and ordering.
//!
//! [`StackBuilder`] is the only way to obtain a [`Handle`]: every `add_*`
//! call validates the declaration, resolves the handles it holds against
//! what was added before, and issues a typed handle for the new resource.
//! Because a handle can only point at something already in the graph,
//! declaration order is always a valid creation order; [`StackBuilder::build`]
//! still runs a full topological sort so the graph is checked as a whole.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

use stack_types::{
    Attribute, ComputePool, Declaration, Environment, ExecutionRole, ExperimentTemplate, GraphId,
    Handle, HandleRef, LoadBalancerFront, LogicalId, NetworkBoundary, OutputValue, Resource,
    ResourceKind, SafetyAlarm, ValidationError,
};

use crate::policy::{check_least_privilege, required_grants};
use crate::validate::{self, Result};

/// One declared resource.
#[derive(Debug, Clone)]
pub struct Node {
    /// Logical ID.
    pub id: LogicalId,
    /// The declaration.
    pub declaration: Declaration,
    /// Resources this one references, in field order.
    pub dependencies: Vec<LogicalId>,
    /// SHA-256 of the canonical JSON declaration.
    pub fingerprint: String,
}

fn fingerprint(id: &LogicalId, declaration: &Declaration) -> Result<String> {
    let canonical =
        serde_json::to_vec(declaration).map_err(|e| ValidationError::Serialization {
            id: id.clone(),
            reason: e.to_string(),
        })?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Builder for a [`StackGraph`].
#[derive(Debug)]
pub struct StackBuilder {
    graph: GraphId,
    env: Environment,
    nodes: Vec<Node>,
    index: HashMap<LogicalId, usize>,
    outputs: BTreeMap<String, OutputValue>,
}

impl StackBuilder {
    /// Start an empty stack in `env`.
    pub fn new(env: Environment) -> Self {
        Self {
            graph: GraphId::new(),
            env,
            nodes: Vec::new(),
            index: HashMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Environment the stack targets.
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Add a network boundary.
    pub fn add_network(
        &mut self,
        id: &str,
        network: NetworkBoundary,
    ) -> Result<Handle<NetworkBoundary>> {
        let id = LogicalId::new(id)?;
        validate::network(&id, &network)?;
        self.insert(id, network)
    }

    /// Add a compute pool inside an already-declared network.
    pub fn add_compute_pool(&mut self, id: &str, pool: ComputePool) -> Result<Handle<ComputePool>> {
        let id = LogicalId::new(id)?;
        validate::compute_pool(&id, &pool)?;
        self.insert(id, pool)
    }

    /// Add a load balancer in front of a pool.
    ///
    /// The balancer must sit in the pool's network.
    pub fn add_load_balancer(
        &mut self,
        id: &str,
        balancer: LoadBalancerFront,
    ) -> Result<Handle<LoadBalancerFront>> {
        let id = LogicalId::new(id)?;
        validate::load_balancer(&id, &balancer)?;
        let pool = self.lookup(&id, &balancer.target)?;
        if pool.network != balancer.network {
            return Err(ValidationError::LoadBalancer {
                id,
                reason: format!(
                    "placed in {} but pool {} runs in {}",
                    balancer.network.id(),
                    balancer.target.id(),
                    pool.network.id()
                ),
            });
        }
        self.insert(id, balancer)
    }

    /// Add a safety alarm on a pool metric.
    pub fn add_alarm(&mut self, id: &str, alarm: SafetyAlarm) -> Result<Handle<SafetyAlarm>> {
        let id = LogicalId::new(id)?;
        validate::alarm(&id, &alarm)?;
        let pool = self.lookup(&id, &alarm.metric.pool)?;
        if alarm.metric.is_terminating_instances() && !pool.group_metrics {
            return Err(ValidationError::Alarm {
                id,
                reason: format!(
                    "pool {} does not publish group metrics",
                    alarm.metric.pool.id()
                ),
            });
        }
        self.insert(id, alarm)
    }

    /// Add an execution role.
    pub fn add_role(&mut self, id: &str, role: ExecutionRole) -> Result<Handle<ExecutionRole>> {
        let id = LogicalId::new(id)?;
        validate::role(&id, &role)?;
        self.insert(id, role)
    }

    /// Add an experiment template.
    ///
    /// Besides its own invariants this checks that every target can match
    /// the pool's tags, that every stop condition fires on rising
    /// terminations, and that the role grants exactly what the actions need.
    pub fn add_experiment(
        &mut self,
        id: &str,
        template: ExperimentTemplate,
    ) -> Result<Handle<ExperimentTemplate>> {
        let id = LogicalId::new(id)?;
        validate::experiment(&id, &template)?;

        for (name, target) in &template.targets {
            let pool = self.lookup(&id, &target.pool)?;
            for (key, value) in &target.resource_tags {
                if pool.tags.get(key) != Some(value) {
                    return Err(ValidationError::Experiment {
                        id,
                        reason: format!(
                            "target {} filters on {}={} which pool {} does not tag",
                            name,
                            key,
                            value,
                            target.pool.id()
                        ),
                    });
                }
            }
        }

        for condition in &template.stop_conditions {
            let alarm = self.lookup(&id, &condition.alarm)?;
            if alarm.metric.is_terminating_instances() && !alarm.comparison.is_upper_bound() {
                return Err(ValidationError::Experiment {
                    id,
                    reason: format!(
                        "stop condition {} fires when terminations fall below the threshold",
                        condition.alarm.id()
                    ),
                });
            }
        }

        let role = self.lookup(&id, &template.role)?;
        let required = required_grants(&template, &self.env);
        check_least_privilege(role, &required).map_err(|v| ValidationError::LeastPrivilege {
            id: template.role.id().clone(),
            reason: v.to_string(),
        })?;

        self.insert(id, template)
    }

    /// Expose a resource attribute as a named stack output.
    pub fn add_output(&mut self, name: &str, value: OutputValue) -> Result<()> {
        let fail = |reason: String| ValidationError::Output {
            name: name.to_string(),
            reason,
        };
        if LogicalId::new(name).is_err() {
            return Err(fail("output names must be alphanumeric".into()));
        }
        if self.outputs.contains_key(name) {
            return Err(fail("duplicate output name".into()));
        }
        let target = &value.resource;
        if target.graph != self.graph {
            return Err(fail(format!("{} belongs to a different stack", target.id)));
        }
        match self.index.get(&target.id) {
            Some(&i) if self.nodes[i].declaration.kind() == target.kind => {}
            _ => return Err(fail(format!("unknown resource {}", target.id))),
        }
        if value.attribute == Attribute::DnsName && target.kind != ResourceKind::LoadBalancerFront {
            return Err(fail(format!("{} has no DNS name", target.id)));
        }
        self.outputs.insert(name.to_string(), value);
        Ok(())
    }

    /// Finish the graph: topologically sort it and compute dependency levels.
    pub fn build(self) -> Result<StackGraph> {
        let n = self.nodes.len();
        let mut indegree: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                let j = self.index[dep];
                dependents[j].push(i);
            }
        }

        // Kahn's algorithm, always taking the earliest-declared ready node.
        let mut order = Vec::with_capacity(n);
        let mut done = vec![false; n];
        while order.len() < n {
            let next = (0..n).find(|&i| !done[i] && indegree[i] == 0);
            let Some(i) = next else {
                let stuck = (0..n).find(|&i| !done[i]).unwrap_or(0);
                return Err(ValidationError::Cycle(self.nodes[stuck].id.clone()));
            };
            done[i] = true;
            order.push(i);
            for &d in &dependents[i] {
                indegree[d] -= 1;
            }
        }

        let mut levels = vec![0usize; n];
        for &i in &order {
            let level = self.nodes[i]
                .dependencies
                .iter()
                .map(|dep| levels[self.index[dep]] + 1)
                .max()
                .unwrap_or(0);
            levels[i] = level;
        }

        Ok(StackGraph {
            id: self.graph,
            env: self.env,
            nodes: self.nodes,
            index: self.index,
            order,
            levels,
            outputs: self.outputs,
        })
    }

    fn lookup<T: Resource>(&self, from: &LogicalId, handle: &Handle<T>) -> Result<&T> {
        if handle.graph() != self.graph {
            return Err(ValidationError::ForeignHandle {
                from: from.clone(),
                to: handle.id().clone(),
            });
        }
        self.index
            .get(handle.id())
            .and_then(|&i| T::from_declaration(&self.nodes[i].declaration))
            .ok_or_else(|| ValidationError::UnknownReference {
                from: from.clone(),
                to: handle.id().clone(),
            })
    }

    fn check_reference(&self, from: &LogicalId, reference: &HandleRef) -> Result<()> {
        if reference.graph != self.graph {
            return Err(ValidationError::ForeignHandle {
                from: from.clone(),
                to: reference.id.clone(),
            });
        }
        match self.index.get(&reference.id) {
            Some(&i) if self.nodes[i].declaration.kind() == reference.kind => Ok(()),
            _ => Err(ValidationError::UnknownReference {
                from: from.clone(),
                to: reference.id.clone(),
            }),
        }
    }

    fn insert<T: Resource>(&mut self, id: LogicalId, resource: T) -> Result<Handle<T>> {
        if self.index.contains_key(&id) {
            return Err(ValidationError::DuplicateLogicalId(id));
        }
        let references = resource.references();
        for reference in &references {
            self.check_reference(&id, reference)?;
        }
        let declaration: Declaration = resource.into();
        let fingerprint = fingerprint(&id, &declaration)?;
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Node {
            id: id.clone(),
            declaration,
            dependencies: references.into_iter().map(|r| r.id).collect(),
            fingerprint,
        });
        Ok(Handle::issue(self.graph, id))
    }
}

/// An immutable, validated, topologically sorted stack.
#[derive(Debug, Clone)]
pub struct StackGraph {
    id: GraphId,
    env: Environment,
    nodes: Vec<Node>,
    index: HashMap<LogicalId, usize>,
    order: Vec<usize>,
    levels: Vec<usize>,
    outputs: BTreeMap<String, OutputValue>,
}

impl StackGraph {
    /// Graph identity.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Environment the stack targets.
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the stack declares nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by logical ID.
    pub fn node(&self, id: &LogicalId) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().map(move |&i| &self.nodes[i])
    }

    /// Resolve a handle issued by this graph.
    pub fn get<T: Resource>(&self, handle: &Handle<T>) -> Option<&T> {
        if handle.graph() != self.id {
            return None;
        }
        self.node(handle.id())
            .and_then(|n| T::from_declaration(&n.declaration))
    }

    /// Re-issue a typed handle for a resource of kind `T`.
    pub fn handle<T: Resource>(&self, id: &LogicalId) -> Option<Handle<T>> {
        self.node(id)
            .filter(|n| n.declaration.kind() == T::KIND)
            .map(|n| Handle::issue(self.id, n.id.clone()))
    }

    /// Every resource of kind `T`, in creation order.
    pub fn resources<T: Resource>(&self) -> Vec<(Handle<T>, &T)> {
        self.nodes()
            .filter_map(|n| {
                T::from_declaration(&n.declaration)
                    .map(|r| (Handle::issue(self.id, n.id.clone()), r))
            })
            .collect()
    }

    /// Logical IDs in an order where every resource follows its dependencies.
    pub fn creation_order(&self) -> Vec<&LogicalId> {
        self.order.iter().map(|&i| &self.nodes[i].id).collect()
    }

    /// Logical IDs in reverse creation order.
    pub fn teardown_order(&self) -> Vec<&LogicalId> {
        self.order.iter().rev().map(|&i| &self.nodes[i].id).collect()
    }

    /// Dependency levels. Resources in one wave depend only on earlier waves
    /// and can be applied concurrently.
    pub fn waves(&self) -> Vec<Vec<&LogicalId>> {
        let depth = self.levels.iter().copied().max().map_or(0, |m| m + 1);
        let mut waves: Vec<Vec<&LogicalId>> = vec![Vec::new(); depth];
        for &i in &self.order {
            waves[self.levels[i]].push(&self.nodes[i].id);
        }
        waves
    }

    /// Direct dependencies of a resource.
    pub fn dependencies_of(&self, id: &LogicalId) -> &[LogicalId] {
        self.node(id)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Resources that directly depend on `id`, in creation order.
    pub fn dependents_of(&self, id: &LogicalId) -> Vec<&LogicalId> {
        self.nodes()
            .filter(|n| n.dependencies.contains(id))
            .map(|n| &n.id)
            .collect()
    }

    /// Fingerprint of a resource's declaration.
    pub fn fingerprint(&self, id: &LogicalId) -> Option<&str> {
        self.node(id).map(|n| n.fingerprint.as_str())
    }

    /// Named outputs.
    pub fn outputs(&self) -> &BTreeMap<String, OutputValue> {
        &self.outputs
    }
}
