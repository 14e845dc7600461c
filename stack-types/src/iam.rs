//! Execution role declaration.

use serde::Serialize;
use std::fmt;

use crate::ids::{Arn, Environment};

/// Service principal of the fault-injection service.
pub const FIS_SERVICE_PRINCIPAL: &str = "fis.amazonaws.com";

/// The single action the experiment needs.
pub const TERMINATE_INSTANCES_ACTION: &str = "ec2:TerminateInstances";

/// A service allowed to assume a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ServicePrincipal(String);

impl ServicePrincipal {
    /// The fault-injection service.
    pub fn fis() -> Self {
        Self(FIS_SERVICE_PRINCIPAL.into())
    }

    /// Any other service principal.
    pub fn new(service: &str) -> Self {
        Self(service.into())
    }

    /// The principal as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ARN pattern where `*` matches any run of characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourcePattern(String);

impl ResourcePattern {
    /// A literal pattern.
    pub fn new(pattern: &str) -> Self {
        Self(pattern.into())
    }

    /// Every instance in the environment's account and region.
    pub fn instances(env: &Environment) -> Self {
        Self(format!(
            "arn:aws:ec2:{}:{}:instance/*",
            env.region, env.account
        ))
    }

    /// The pattern as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the pattern matches the ARN.
    pub fn matches(&self, arn: &Arn) -> bool {
        glob_match(self.0.as_bytes(), arn.to_string().as_bytes())
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

/// Statement effect. Only grants are modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Effect {
    /// Grant.
    Allow,
}

/// One granted action on one resource pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PolicyStatement {
    /// Effect.
    pub effect: Effect,
    /// Action, e.g. `ec2:TerminateInstances`.
    pub action: String,
    /// Resources the action is granted on.
    pub resource: ResourcePattern,
}

/// A credential assumed by the fault-injection service to act on instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRole {
    /// The only principal allowed to assume the role.
    pub trusted_principal: ServicePrincipal,
    /// Granted permissions.
    pub statements: Vec<PolicyStatement>,
}

impl ExecutionRole {
    /// A role with no permissions, assumable by `principal`.
    pub fn assumable_by(principal: ServicePrincipal) -> Self {
        Self {
            trusted_principal: principal,
            statements: Vec::new(),
        }
    }

    /// Grant an action on a resource pattern.
    pub fn allow(mut self, action: &str, resource: ResourcePattern) -> Self {
        self.statements.push(PolicyStatement {
            effect: Effect::Allow,
            action: action.into(),
            resource,
        });
        self
    }

    /// Whether the role permits `action` on `arn`.
    pub fn permits(&self, action: &str, arn: &Arn) -> bool {
        self.statements
            .iter()
            .any(|s| action_matches(&s.action, action) && s.resource.matches(arn))
    }
}

fn action_matches(granted: &str, requested: &str) -> bool {
    glob_match(
        granted.to_ascii_lowercase().as_bytes(),
        requested.to_ascii_lowercase().as_bytes(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::new("678949171549", "eu-north-1").unwrap()
    }

    fn instance_arn(region: &str, id: &str) -> Arn {
        Arn::new("ec2", region, "678949171549", &format!("instance/{}", id))
    }

    #[test]
    fn instance_pattern_matches_instances_only() {
        let pattern = ResourcePattern::instances(&env());
        assert_eq!(pattern.as_str(), "arn:aws:ec2:eu-north-1:678949171549:instance/*");
        assert!(pattern.matches(&instance_arn("eu-north-1", "i-0abc")));
        assert!(!pattern.matches(&instance_arn("us-east-1", "i-0abc")));
        assert!(!pattern.matches(&Arn::new(
            "ec2",
            "eu-north-1",
            "678949171549",
            "volume/vol-1"
        )));
    }

    #[test]
    fn glob_edge_cases() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"a*c", b"abbbc"));
        assert!(!glob_match(b"a*c", b"abbbd"));
        assert!(glob_match(b"a**", b"a"));
    }

    #[test]
    fn role_permits_exact_grant() {
        let role = ExecutionRole::assumable_by(ServicePrincipal::fis())
            .allow(TERMINATE_INSTANCES_ACTION, ResourcePattern::instances(&env()));
        let arn = instance_arn("eu-north-1", "i-1");
        assert!(role.permits("ec2:TerminateInstances", &arn));
        assert!(role.permits("ec2:terminateinstances", &arn));
        assert!(!role.permits("ec2:StopInstances", &arn));
    }

    #[test]
    fn wildcard_action_permits_everything() {
        let role = ExecutionRole::assumable_by(ServicePrincipal::fis())
            .allow("ec2:*", ResourcePattern::new("*"));
        assert!(role.permits("ec2:StopInstances", &instance_arn("us-east-1", "i-1")));
    }
}
