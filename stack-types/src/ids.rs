//! Identity types for chaos-stack.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::ValidationError;

/// Maximum length of a logical ID.
const MAX_LOGICAL_ID_LEN: usize = 255;

/// The name of a resource inside a stack declaration.
///
/// Logical IDs are alphanumeric (`chaosVPC`, `ASG`, `chaosLB`) and unique
/// within a stack. They never change across re-applications; the physical
/// identity of a resource does.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalId(String);

impl LogicalId {
    /// Create a LogicalId, rejecting empty or non-alphanumeric names.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty()
            || id.len() > MAX_LOGICAL_ID_LEN
            || !id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValidationError::InvalidLogicalId(id));
        }
        Ok(Self(id))
    }

    /// Get the logical ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LogicalId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LogicalId> for String {
    fn from(id: LogicalId) -> Self {
        id.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicalId({})", self.0)
    }
}

/// The identity a provider assigned to a materialized resource.
///
/// `vpc-0a1b2c3d4e5f60718`, an Auto Scaling group name, an alarm name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalId(String);

impl PhysicalId {
    /// Wrap an existing provider identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier of the form `<prefix>-<17 hex chars>`.
    pub fn generate(prefix: &str) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", prefix, &suffix[..17]))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhysicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PhysicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalId({})", self.0)
    }
}

/// An Amazon Resource Name.
///
/// `arn:<partition>:<service>:<region>:<account>:<resource>`. Region and
/// account are empty for global services such as IAM.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Arn {
    /// Partition, normally `aws`.
    pub partition: String,
    /// Service namespace (`ec2`, `iam`, `cloudwatch`, `fis`).
    pub service: String,
    /// Region, empty for global services.
    pub region: String,
    /// Account ID, empty for some service-owned resources.
    pub account: String,
    /// Resource part, may itself contain `:` and `/`.
    pub resource: String,
}

impl Arn {
    /// Build an ARN in the `aws` partition.
    pub fn new(service: &str, region: &str, account: &str, resource: &str) -> Self {
        Self {
            partition: "aws".into(),
            service: service.into(),
            region: region.into(),
            account: account.into(),
            resource: resource.into(),
        }
    }
}

impl FromStr for Arn {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(6, ':').collect();
        if parts.len() != 6 || parts[0] != "arn" || parts[1].is_empty() || parts[2].is_empty() {
            return Err(ValidationError::InvalidArn(s.to_string()));
        }
        Ok(Self {
            partition: parts[1].into(),
            service: parts[2].into(),
            region: parts[3].into(),
            account: parts[4].into(),
            resource: parts[5].into(),
        })
    }
}

impl TryFrom<String> for Arn {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Arn> for String {
    fn from(arn: Arn) -> Self {
        arn.to_string()
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

impl fmt::Debug for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Arn({})", self)
    }
}

/// The account and region a stack is instantiated into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    /// 12-digit account ID.
    pub account: String,
    /// Region name, e.g. `eu-north-1`.
    pub region: String,
}

impl Environment {
    /// Create an environment, validating the account and region format.
    pub fn new(account: &str, region: &str) -> Result<Self, ValidationError> {
        let env = Self {
            account: account.into(),
            region: region.into(),
        };
        env.validate()?;
        Ok(env)
    }

    /// Check the account is 12 digits and the region is a lowercase name.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.account.len() != 12 || !self.account.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidEnvironment(format!(
                "account must be 12 digits, got {:?}",
                self.account
            )));
        }
        let region_ok = !self.region.is_empty()
            && self
                .region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !region_ok {
            return Err(ValidationError::InvalidEnvironment(format!(
                "invalid region {:?}",
                self.region
            )));
        }
        Ok(())
    }
}

/// Identity of one stack graph under construction.
///
/// Every handle carries the ID of the graph that issued it, so a handle
/// cannot be smuggled into a different stack.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(uuid::Uuid);

impl GraphId {
    /// Create a new random GraphId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphId({})", &self.0.simple().to_string()[..8])
    }
}

/// A typed reference to a resource declared in a stack graph.
///
/// Handles are issued by the graph builder when a resource is added. The type
/// parameter ties the reference to the kind of resource it points at, so an
/// experiment cannot be given an alarm where a role is expected. Serializes
/// as the referenced logical ID.
pub struct Handle<T> {
    graph: GraphId,
    id: LogicalId,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Issue a handle. Intended for graph builders only.
    #[doc(hidden)]
    pub fn issue(graph: GraphId, id: LogicalId) -> Self {
        Self {
            graph,
            id,
            _kind: PhantomData,
        }
    }

    /// The logical ID of the referenced resource.
    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    /// The graph that issued this handle.
    pub fn graph(&self) -> GraphId {
        self.graph
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph,
            id: self.id.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.graph == other.graph && self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.graph.hash(state);
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.id)
    }
}

impl<T> Serialize for Handle<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}
