//! Error types for chaos-stack declarations.

use thiserror::Error;

use crate::ids::LogicalId;

/// Errors raised while declaring or validating a stack.
///
/// All of these are detected before anything is provisioned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Logical ID is empty, too long or not alphanumeric
    #[error("invalid logical id: {0:?}")]
    InvalidLogicalId(String),

    /// Two resources share a logical ID
    #[error("duplicate logical id: {0}")]
    DuplicateLogicalId(LogicalId),

    /// Malformed ARN string
    #[error("invalid arn: {0}")]
    InvalidArn(String),

    /// Malformed CIDR block
    #[error("invalid cidr: {0}")]
    InvalidCidr(String),

    /// Account or region is malformed
    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    /// A handle was issued by a different stack graph
    #[error("{from} references {to}, which belongs to a different stack")]
    ForeignHandle {
        /// The declaring resource.
        from: LogicalId,
        /// The referenced resource.
        to: LogicalId,
    },

    /// A handle points at a resource that is not in the graph
    #[error("{from} references unknown resource {to}")]
    UnknownReference {
        /// The declaring resource.
        from: LogicalId,
        /// The referenced resource.
        to: LogicalId,
    },

    /// The dependency graph has a cycle
    #[error("dependency cycle involving {0}")]
    Cycle(LogicalId),

    /// Network boundary invariant violated
    #[error("invalid network boundary {id}: {reason}")]
    Network {
        /// The offending resource.
        id: LogicalId,
        /// What is wrong.
        reason: String,
    },

    /// Pool bounds violated (min > max, desired outside range)
    #[error("invalid compute pool {id}: min={min}, max={max}")]
    PoolBounds {
        /// The offending resource.
        id: LogicalId,
        /// Declared minimum size.
        min: u32,
        /// Declared maximum size.
        max: u32,
    },

    /// Other compute pool invariant violated
    #[error("invalid compute pool {id}: {reason}")]
    ComputePool {
        /// The offending resource.
        id: LogicalId,
        /// What is wrong.
        reason: String,
    },

    /// Load balancer or health check invariant violated
    #[error("invalid load balancer {id}: {reason}")]
    LoadBalancer {
        /// The offending resource.
        id: LogicalId,
        /// What is wrong.
        reason: String,
    },

    /// Alarm invariant violated
    #[error("invalid alarm {id}: {reason}")]
    Alarm {
        /// The offending resource.
        id: LogicalId,
        /// What is wrong.
        reason: String,
    },

    /// Role grants more (or less) than the experiment needs
    #[error("least privilege violated by {id}: {reason}")]
    LeastPrivilege {
        /// The offending role.
        id: LogicalId,
        /// What is wrong.
        reason: String,
    },

    /// Experiment template invariant violated
    #[error("invalid experiment template {id}: {reason}")]
    Experiment {
        /// The offending resource.
        id: LogicalId,
        /// What is wrong.
        reason: String,
    },

    /// Output refers to a missing resource or duplicates a name
    #[error("invalid output {name}: {reason}")]
    Output {
        /// Output name.
        name: String,
        /// What is wrong.
        reason: String,
    },

    /// Declaration could not be rendered to its canonical form
    #[error("failed to serialize {id}: {reason}")]
    Serialization {
        /// The offending resource.
        id: LogicalId,
        /// Serializer message.
        reason: String,
    },
}
