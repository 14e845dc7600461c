//! Cloud provider abstraction.
//!
//! The engine never talks to a cloud directly. Everything it needs, from
//! creating a resource to terminating an instance, goes through
//! [`CloudProvider`], so a run can be pointed at a real account or at the
//! in-process [`SimulatedCloud`].
//!
//! # Design
//!
//! The provider is stateless from the engine's point of view:
//! - `create()` / `delete()` materialize and remove declarations
//! - `describe()` reports what is live, including the fingerprint the
//!   resource was created from
//! - the remaining calls are the runtime API the experiment runner uses
//!
//! # Example
//!
//! ```ignore
//! let cloud = SimulatedCloud::new(env);
//! let record = cloud.create(request).await?;
//! let instances = cloud.describe_instances(&record.physical_id).await?;
//! ```

mod simulated;

pub use simulated::SimulatedCloud;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use stack_core::InstanceSnapshot;
use stack_types::{AlarmState, Arn, Declaration, LogicalId, PhysicalId, ResourceKind};

/// Provider errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// The caller is not allowed to perform the action.
    #[error("access denied: {action} on {resource}")]
    AccessDenied {
        /// Requested action.
        action: String,
        /// Resource the action was requested on.
        resource: String,
    },

    /// The resource does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Resource kind.
        kind: ResourceKind,
        /// Physical ID asked for.
        id: String,
    },

    /// A declaration references a resource that is not materialized.
    #[error("{from} references {to}, which is not provisioned")]
    UnresolvedReference {
        /// The declaring resource.
        from: LogicalId,
        /// The missing resource.
        to: LogicalId,
    },

    /// The resource cannot be deleted while others depend on it.
    #[error("{id} still has dependents: {dependents:?}")]
    DependencyViolation {
        /// Resource whose deletion was refused.
        id: PhysicalId,
        /// Resources that still reference it.
        dependents: Vec<PhysicalId>,
    },

    /// No such instance.
    #[error("instance {0} not found")]
    InstanceNotFound(PhysicalId),

    /// The request is well-formed but cannot be satisfied here.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Failure injected by a test hook.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// A materialized resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Provider-assigned identity.
    pub physical_id: PhysicalId,
    /// Resource ARN.
    pub arn: Arn,
    /// Public DNS name, load balancers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
}

/// Everything a provider needs to materialize one declaration.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Stack name, used to build physical names.
    pub stack: String,
    /// Logical ID of the resource.
    pub logical_id: LogicalId,
    /// The declaration.
    pub declaration: Declaration,
    /// Fingerprint the provider must report back from `describe()`.
    pub fingerprint: String,
    /// Records of every resource the declaration references.
    pub references: BTreeMap<LogicalId, ResourceRecord>,
}

impl CreateRequest {
    /// Resolve a referenced logical ID.
    pub fn resolve(&self, to: &LogicalId) -> Result<&ResourceRecord, ProviderError> {
        self.references
            .get(to)
            .ok_or_else(|| ProviderError::UnresolvedReference {
                from: self.logical_id.clone(),
                to: to.clone(),
            })
    }
}

/// Live view of a materialized resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveResource {
    /// The record the provider returned at creation.
    pub record: ResourceRecord,
    /// Fingerprint of the configuration currently live.
    pub fingerprint: String,
}

/// Credentials obtained by assuming an execution role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The assumed role.
    pub role_arn: Arn,
    /// The principal that assumed it.
    pub principal: String,
}

/// Load balancer view of one registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetHealthState {
    /// Registered, not enough probes yet.
    Initial,
    /// Receiving traffic.
    Healthy,
    /// Failing probes, no traffic.
    Unhealthy,
    /// Being deregistered.
    Draining,
}

impl TargetHealthState {
    /// Whether the balancer routes requests to the target.
    pub fn receives_traffic(&self) -> bool {
        matches!(self, TargetHealthState::Healthy)
    }
}

/// Health of one load balancer target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetHealth {
    /// Instance ID.
    pub instance: PhysicalId,
    /// Health state.
    pub state: TargetHealthState,
}

/// One listener of a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerDescription {
    /// Listening port.
    pub port: u16,
    /// Protocol, always `HTTP`.
    pub protocol: String,
    /// Pool requests are forwarded to.
    pub target_pool: PhysicalId,
    /// Port on the pool instances.
    pub target_port: u16,
}

/// A load balancer as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerDescription {
    /// Public DNS name.
    pub dns_name: String,
    /// `internet-facing` or `internal`.
    pub scheme: String,
    /// Listeners.
    pub listeners: Vec<ListenerDescription>,
}

/// Cloud provider trait for provisioning resources and injecting faults.
///
/// Implementations handle the underlying API. The engine is generic over
/// this trait so a stack can be exercised without a cloud account.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Materialize a declaration.
    async fn create(&self, request: CreateRequest) -> Result<ResourceRecord, ProviderError>;

    /// Remove a materialized resource.
    async fn delete(&self, kind: ResourceKind, id: &PhysicalId) -> Result<(), ProviderError>;

    /// Describe a resource, `None` if it no longer exists.
    async fn describe(
        &self,
        kind: ResourceKind,
        id: &PhysicalId,
    ) -> Result<Option<LiveResource>, ProviderError>;

    /// Assume an execution role as `principal`.
    async fn assume_role(&self, role: &Arn, principal: &str) -> Result<Session, ProviderError>;

    /// Current members of a compute pool.
    async fn describe_instances(
        &self,
        pool: &PhysicalId,
    ) -> Result<Vec<InstanceSnapshot>, ProviderError>;

    /// Terminate instances with the permissions of `session`.
    ///
    /// Returns the instances whose termination this call started.
    async fn terminate_instances(
        &self,
        session: &Session,
        instances: &[PhysicalId],
    ) -> Result<Vec<PhysicalId>, ProviderError>;

    /// Current state of an alarm.
    async fn describe_alarm(&self, alarm: &PhysicalId) -> Result<AlarmState, ProviderError>;

    /// Health of every target registered with a load balancer.
    async fn describe_target_health(
        &self,
        balancer: &PhysicalId,
    ) -> Result<Vec<TargetHealth>, ProviderError>;

    /// Listener configuration of a load balancer.
    async fn describe_load_balancer(
        &self,
        balancer: &PhysicalId,
    ) -> Result<LoadBalancerDescription, ProviderError>;

    /// Publish one sample of a pool metric.
    async fn put_metric(
        &self,
        pool: &PhysicalId,
        metric: &str,
        value: f64,
    ) -> Result<(), ProviderError>;
}
