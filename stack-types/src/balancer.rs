//! Load balancer front declaration.

use serde::Serialize;
use std::time::Duration;

use crate::compute::ComputePool;
use crate::ids::Handle;
use crate::network::NetworkBoundary;

/// Health check applied to every pool member registered with the balancer.
///
/// Health decides whether a member receives traffic. It does not decide
/// pool membership: an unhealthy member still counts toward the pool size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    /// HTTP path probed on each member.
    pub path: String,
    /// Time between probes.
    pub interval: Duration,
    /// Consecutive successes before a member is healthy.
    pub healthy_threshold: u32,
    /// Consecutive failures before a member is unhealthy.
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/".into(),
            interval: Duration::from_secs(30),
            healthy_threshold: 5,
            unhealthy_threshold: 2,
        }
    }
}

/// An ingress rule on the balancer's security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressRule {
    /// Source range.
    pub cidr: String,
    /// Destination port.
    pub port: u16,
    /// Description shown on the rule.
    pub description: String,
}

impl IngressRule {
    /// Allow the port from `0.0.0.0/0`.
    pub fn any_ipv4(port: u16, description: &str) -> Self {
        Self {
            cidr: "0.0.0.0/0".into(),
            port,
            description: description.into(),
        }
    }
}

/// A load balancer that routes external traffic to healthy pool members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerFront {
    /// Network the balancer is placed in.
    pub network: Handle<NetworkBoundary>,
    /// Reachable from the internet.
    pub internet_facing: bool,
    /// Port of the single HTTP listener.
    pub listener_port: u16,
    /// Pool the listener forwards to.
    pub target: Handle<ComputePool>,
    /// Port traffic is forwarded to on each member.
    pub target_port: u16,
    /// Member health policy.
    pub health_check: HealthCheck,
    /// Ingress rules opened on the listener.
    pub ingress: Vec<IngressRule>,
}

impl LoadBalancerFront {
    /// An internet-facing balancer with one listener forwarding to the same port.
    pub fn new(network: &Handle<NetworkBoundary>, target: &Handle<ComputePool>, port: u16) -> Self {
        Self {
            network: network.clone(),
            internet_facing: true,
            listener_port: port,
            target: target.clone(),
            target_port: port,
            health_check: HealthCheck::default(),
            ingress: Vec::new(),
        }
    }

    /// Replace the health check.
    pub fn health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = health_check;
        self
    }

    /// Open the listener port to any IPv4 source.
    pub fn allow_listener_from_anywhere(mut self, description: &str) -> Self {
        self.ingress
            .push(IngressRule::any_ipv4(self.listener_port, description));
        self
    }
}
