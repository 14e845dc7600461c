//! Least-privilege check and IAM document rendering for execution roles.

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use stack_types::{
    Effect, Environment, ExecutionRole, ExperimentTemplate, ResourcePattern,
    FIS_SERVICE_PRINCIPAL,
};

/// One (action, resource pattern) pair a role must grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Grant {
    /// IAM action.
    pub action: String,
    /// Resource pattern.
    pub resource: ResourcePattern,
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.action, self.resource)
    }
}

/// Ways a role can deviate from least privilege.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    /// Role is assumable by someone other than the fault-injection service
    #[error("role trusts {0}, expected fis.amazonaws.com")]
    UntrustedPrincipal(String),

    /// Statement grants a wildcard action
    #[error("wildcard action {0}")]
    WildcardAction(String),

    /// A required grant is absent
    #[error("missing grant: {0}")]
    Missing(Grant),

    /// A grant beyond what the experiment needs
    #[error("excess grant: {0}")]
    Excess(Grant),

    /// The same grant appears more than once
    #[error("duplicate grant: {0}")]
    Duplicate(Grant),
}

/// Grants an experiment needs: each action's permission on every instance
/// in the environment.
pub fn required_grants(template: &ExperimentTemplate, env: &Environment) -> BTreeSet<Grant> {
    template
        .actions
        .values()
        .map(|a| Grant {
            action: a.action.required_permission().to_string(),
            resource: ResourcePattern::instances(env),
        })
        .collect()
}

/// Check that `role` grants exactly `required` and nothing else.
pub fn check_least_privilege(
    role: &ExecutionRole,
    required: &BTreeSet<Grant>,
) -> Result<(), PolicyViolation> {
    if role.trusted_principal.as_str() != FIS_SERVICE_PRINCIPAL {
        return Err(PolicyViolation::UntrustedPrincipal(
            role.trusted_principal.to_string(),
        ));
    }

    let mut granted = BTreeSet::new();
    for statement in &role.statements {
        if statement.action.contains('*') {
            return Err(PolicyViolation::WildcardAction(statement.action.clone()));
        }
        let grant = Grant {
            action: statement.action.clone(),
            resource: statement.resource.clone(),
        };
        if !granted.insert(grant.clone()) {
            return Err(PolicyViolation::Duplicate(grant));
        }
    }

    if let Some(excess) = granted.difference(required).next() {
        return Err(PolicyViolation::Excess(excess.clone()));
    }
    if let Some(missing) = required.difference(&granted).next() {
        return Err(PolicyViolation::Missing(missing.clone()));
    }
    Ok(())
}

/// The role's permission policy as an IAM JSON document.
pub fn policy_document(role: &ExecutionRole) -> Value {
    let statements: Vec<Value> = role
        .statements
        .iter()
        .map(|s| {
            json!({
                "Effect": effect_name(s.effect),
                "Action": s.action,
                "Resource": s.resource.as_str(),
            })
        })
        .collect();
    json!({
        "Version": "2012-10-17",
        "Statement": statements,
    })
}

/// The role's trust policy as an IAM JSON document.
pub fn trust_document(role: &ExecutionRole) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": role.trusted_principal.as_str() },
            "Action": "sts:AssumeRole",
        }],
    })
}

fn effect_name(effect: Effect) -> &'static str {
    match effect {
        Effect::Allow => "Allow",
    }
}
