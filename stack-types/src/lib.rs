//! # stack-types
//!
//! Resource declaration types for the chaos-stack test environment.
//!
//! This crate provides the foundational types used across all chaos-stack crates:
//! - [`LogicalId`], [`PhysicalId`], [`Arn`], [`Environment`] - Identity types
//! - [`Handle`] - Typed reference from one declaration to another
//! - [`NetworkBoundary`], [`ComputePool`], [`LoadBalancerFront`], [`SafetyAlarm`],
//!   [`ExecutionRole`], [`ExperimentTemplate`] - The six resource declarations
//! - [`Declaration`] - Type-erased declaration stored in a stack graph
//! - [`ValidationError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod alarm;
mod balancer;
mod compute;
mod error;
mod experiment;
mod iam;
mod ids;
mod network;
mod resource;

pub use alarm::{
    AlarmState, ComparisonOperator, MetricRef, MissingDataPolicy, SafetyAlarm, Statistic,
    AUTOSCALING_NAMESPACE, TERMINATING_INSTANCES_METRIC,
};
pub use balancer::{HealthCheck, IngressRule, LoadBalancerFront};
pub use compute::{
    BootScript, ComputePool, InstanceClass, InstanceShape, InstanceSize, InstanceState,
    MachineImage, ScalingRule,
};
pub use error::ValidationError;
pub use experiment::{
    ActionKind, ExperimentAction, ExperimentTemplate, SelectionMode, StopCondition,
    StopConditionSource, TargetResourceType, TargetSelector, INSTANCES_TARGET_KEY,
};
pub use iam::{
    Effect, ExecutionRole, PolicyStatement, ResourcePattern, ServicePrincipal,
    FIS_SERVICE_PRINCIPAL, TERMINATE_INSTANCES_ACTION,
};
pub use ids::{Arn, Environment, GraphId, Handle, LogicalId, PhysicalId};
pub use network::{Cidr, NetworkBoundary, SubnetSpec, SubnetVisibility};
pub use resource::{Attribute, Declaration, HandleRef, OutputValue, Resource, ResourceKind};
