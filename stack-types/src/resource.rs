//! Type-erased declarations and the [`Resource`] trait tying them to handles.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::alarm::SafetyAlarm;
use crate::balancer::LoadBalancerFront;
use crate::compute::ComputePool;
use crate::experiment::ExperimentTemplate;
use crate::iam::ExecutionRole;
use crate::ids::{GraphId, Handle, LogicalId};
use crate::network::NetworkBoundary;

/// The six kinds of resource a stack is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Network boundary (VPC and subnets).
    NetworkBoundary,
    /// Compute pool (Auto Scaling group).
    ComputePool,
    /// Load balancer front (ALB, listener, target group).
    LoadBalancerFront,
    /// Safety alarm (metric alarm).
    SafetyAlarm,
    /// Execution role (IAM role).
    ExecutionRole,
    /// Experiment template (FIS).
    ExperimentTemplate,
}

impl ResourceKind {
    /// CloudFormation resource type the kind synthesizes to.
    pub fn cloudformation_type(&self) -> &'static str {
        match self {
            ResourceKind::NetworkBoundary => "AWS::EC2::VPC",
            ResourceKind::ComputePool => "AWS::AutoScaling::AutoScalingGroup",
            ResourceKind::LoadBalancerFront => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            ResourceKind::SafetyAlarm => "AWS::CloudWatch::Alarm",
            ResourceKind::ExecutionRole => "AWS::IAM::Role",
            ResourceKind::ExperimentTemplate => "AWS::FIS::ExperimentTemplate",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::NetworkBoundary => "network boundary",
            ResourceKind::ComputePool => "compute pool",
            ResourceKind::LoadBalancerFront => "load balancer",
            ResourceKind::SafetyAlarm => "safety alarm",
            ResourceKind::ExecutionRole => "execution role",
            ResourceKind::ExperimentTemplate => "experiment template",
        };
        f.write_str(s)
    }
}

/// A handle with its type erased, as seen by graph validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleRef {
    /// Issuing graph.
    pub graph: GraphId,
    /// Referenced resource.
    pub id: LogicalId,
    /// Kind the handle was typed with.
    pub kind: ResourceKind,
}

impl HandleRef {
    /// Erase the type of a handle.
    pub fn of<T: Resource>(handle: &Handle<T>) -> Self {
        Self {
            graph: handle.graph(),
            id: handle.id().clone(),
            kind: T::KIND,
        }
    }
}

/// A resource declaration of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "properties")]
pub enum Declaration {
    /// Network boundary.
    NetworkBoundary(NetworkBoundary),
    /// Compute pool.
    ComputePool(ComputePool),
    /// Load balancer front.
    LoadBalancerFront(LoadBalancerFront),
    /// Safety alarm.
    SafetyAlarm(SafetyAlarm),
    /// Execution role.
    ExecutionRole(ExecutionRole),
    /// Experiment template.
    ExperimentTemplate(ExperimentTemplate),
}

impl Declaration {
    /// Kind of the declared resource.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Declaration::NetworkBoundary(_) => ResourceKind::NetworkBoundary,
            Declaration::ComputePool(_) => ResourceKind::ComputePool,
            Declaration::LoadBalancerFront(_) => ResourceKind::LoadBalancerFront,
            Declaration::SafetyAlarm(_) => ResourceKind::SafetyAlarm,
            Declaration::ExecutionRole(_) => ResourceKind::ExecutionRole,
            Declaration::ExperimentTemplate(_) => ResourceKind::ExperimentTemplate,
        }
    }

    /// Every handle the declaration holds, deduplicated, in field order.
    pub fn references(&self) -> Vec<HandleRef> {
        match self {
            Declaration::NetworkBoundary(r) => r.references(),
            Declaration::ComputePool(r) => r.references(),
            Declaration::LoadBalancerFront(r) => r.references(),
            Declaration::SafetyAlarm(r) => r.references(),
            Declaration::ExecutionRole(r) => r.references(),
            Declaration::ExperimentTemplate(r) => r.references(),
        }
    }
}

/// A declarable resource kind.
pub trait Resource: Into<Declaration> + Sized {
    /// Kind tag.
    const KIND: ResourceKind;

    /// Handles this declaration holds.
    fn references(&self) -> Vec<HandleRef>;

    /// Borrow the typed declaration back out of a type-erased one.
    fn from_declaration(declaration: &Declaration) -> Option<&Self>;
}

macro_rules! impl_resource {
    ($ty:ident, |$this:ident| $refs:expr) => {
        impl From<$ty> for Declaration {
            fn from(value: $ty) -> Self {
                Declaration::$ty(value)
            }
        }

        impl Resource for $ty {
            const KIND: ResourceKind = ResourceKind::$ty;

            fn references(&self) -> Vec<HandleRef> {
                let $this = self;
                dedup($refs)
            }

            fn from_declaration(declaration: &Declaration) -> Option<&Self> {
                match declaration {
                    Declaration::$ty(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

fn dedup(refs: Vec<HandleRef>) -> Vec<HandleRef> {
    let mut out: Vec<HandleRef> = Vec::with_capacity(refs.len());
    for r in refs {
        if !out.contains(&r) {
            out.push(r);
        }
    }
    out
}

impl_resource!(NetworkBoundary, |_this| Vec::new());
impl_resource!(ComputePool, |this| vec![HandleRef::of(&this.network)]);
impl_resource!(LoadBalancerFront, |this| vec![
    HandleRef::of(&this.network),
    HandleRef::of(&this.target),
]);
impl_resource!(SafetyAlarm, |this| vec![HandleRef::of(&this.metric.pool)]);
impl_resource!(ExecutionRole, |_this| Vec::new());
impl_resource!(ExperimentTemplate, |this| {
    let mut refs = vec![HandleRef::of(&this.role)];
    refs.extend(this.stop_conditions.iter().map(|c| HandleRef::of(&c.alarm)));
    refs.extend(this.targets.values().map(|t| HandleRef::of(&t.pool)));
    refs
});

/// Attribute of a materialized resource exposed as a stack output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    /// The physical ID.
    Ref,
    /// The resource ARN.
    Arn,
    /// The public DNS name (load balancers only).
    DnsName,
}

impl Attribute {
    /// CloudFormation attribute name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Ref => "Ref",
            Attribute::Arn => "Arn",
            Attribute::DnsName => "DNSName",
        }
    }
}

/// The value of a named stack output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputValue {
    /// Resource the value is read from.
    pub resource: HandleRef,
    /// Attribute read.
    pub attribute: Attribute,
}

impl OutputValue {
    /// The public DNS name of a load balancer.
    pub fn dns_name(balancer: &Handle<LoadBalancerFront>) -> Self {
        Self {
            resource: HandleRef::of(balancer),
            attribute: Attribute::DnsName,
        }
    }

    /// The ARN of any resource.
    pub fn arn<T: Resource>(handle: &Handle<T>) -> Self {
        Self {
            resource: HandleRef::of(handle),
            attribute: Attribute::Arn,
        }
    }

    /// The physical ID of any resource.
    pub fn reference<T: Resource>(handle: &Handle<T>) -> Self {
        Self {
            resource: HandleRef::of(handle),
            attribute: Attribute::Ref,
        }
    }
}
