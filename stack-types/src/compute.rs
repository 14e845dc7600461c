//! Compute pool declaration.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::Handle;
use crate::network::NetworkBoundary;

/// Instance family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InstanceClass {
    /// Burstable, general purpose.
    T3,
    /// Burstable, AMD.
    T3a,
    /// General purpose.
    M5,
    /// Compute optimized.
    C5,
}

impl InstanceClass {
    fn as_str(&self) -> &'static str {
        match self {
            InstanceClass::T3 => "t3",
            InstanceClass::T3a => "t3a",
            InstanceClass::M5 => "m5",
            InstanceClass::C5 => "c5",
        }
    }
}

/// Instance size within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InstanceSize {
    /// nano
    Nano,
    /// micro
    Micro,
    /// small
    Small,
    /// medium
    Medium,
    /// large
    Large,
}

impl InstanceSize {
    fn as_str(&self) -> &'static str {
        match self {
            InstanceSize::Nano => "nano",
            InstanceSize::Micro => "micro",
            InstanceSize::Small => "small",
            InstanceSize::Medium => "medium",
            InstanceSize::Large => "large",
        }
    }
}

/// Instance type, e.g. `t3.micro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InstanceShape {
    /// Family.
    pub class: InstanceClass,
    /// Size.
    pub size: InstanceSize,
}

impl InstanceShape {
    /// Combine a family and a size.
    pub fn of(class: InstanceClass, size: InstanceSize) -> Self {
        Self { class, size }
    }
}

impl fmt::Display for InstanceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class.as_str(), self.size.as_str())
    }
}

/// Machine image for pool members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MachineImage {
    /// Latest Amazon Linux 2, resolved through the public SSM parameter.
    AmazonLinux2,
}

impl MachineImage {
    /// SSM parameter the image ID is resolved from.
    pub fn ssm_parameter(&self) -> &'static str {
        match self {
            MachineImage::AmazonLinux2 => {
                "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2"
            }
        }
    }
}

/// Ordered shell commands run when an instance boots.
///
/// The script runs again on every replacement instance, so each command
/// must be safe to repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootScript {
    commands: Vec<String>,
}

impl BootScript {
    /// A script from explicit commands.
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Install httpd, publish a status page naming the host, start and enable it.
    pub fn web_server(banner: &str) -> Self {
        Self::new([
            "sudo su".to_string(),
            "yum install -y httpd".to_string(),
            format!(
                "echo \"<h1>{} $(hostname -f)</h1>\" > /var/www/html/index.html",
                banner
            ),
            "systemctl start httpd".to_string(),
            "systemctl enable httpd".to_string(),
        ])
    }

    /// The commands, in execution order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Whether the script starts the given systemd unit.
    pub fn starts_service(&self, unit: &str) -> bool {
        let start = format!("systemctl start {}", unit);
        self.commands.iter().any(|c| c.trim() == start)
    }

    /// Commands that would not converge when repeated (appending redirects).
    pub fn non_idempotent_commands(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter(|c| c.contains(">>"))
            .map(String::as_str)
            .collect()
    }

    /// Render as instance user data.
    pub fn render(&self) -> String {
        let mut out = String::from("#!/bin/bash\n");
        for command in &self.commands {
            out.push_str(command);
            out.push('\n');
        }
        out
    }
}

/// Lifecycle state of a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    /// Launched, still booting.
    Pending,
    /// Booted.
    Running,
    /// Termination requested, not yet gone.
    ShuttingDown,
    /// Gone.
    Terminated,
}

impl InstanceState {
    /// The EC2 state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target-tracking rule on request count per instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalingRule {
    /// Policy name.
    pub name: String,
    /// Requests per minute each instance should receive.
    pub target_requests_per_minute: u32,
}

/// A self-healing pool of identical web-serving instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputePool {
    /// Network the instances are launched into.
    pub network: Handle<NetworkBoundary>,
    /// Instance type.
    pub shape: InstanceShape,
    /// Machine image.
    pub image: MachineImage,
    /// Boot commands.
    pub boot_script: BootScript,
    /// Lower bound on pool size; the pool heals back to at least this.
    pub min_size: u32,
    /// Upper bound on pool size.
    pub max_size: u32,
    /// Initial desired size, `min_size` when absent.
    pub desired_capacity: Option<u32>,
    /// Scaling rules.
    pub scaling_rules: Vec<ScalingRule>,
    /// Tags propagated to every instance at launch.
    pub tags: BTreeMap<String, String>,
    /// Publish group metrics (terminating-instance count among them).
    pub group_metrics: bool,
}

impl ComputePool {
    /// A pool of size 1 with group metrics enabled.
    pub fn new(
        network: &Handle<NetworkBoundary>,
        shape: InstanceShape,
        boot_script: BootScript,
    ) -> Self {
        Self {
            network: network.clone(),
            shape,
            image: MachineImage::AmazonLinux2,
            boot_script,
            min_size: 1,
            max_size: 1,
            desired_capacity: None,
            scaling_rules: Vec::new(),
            tags: BTreeMap::new(),
            group_metrics: true,
        }
    }

    /// Set the size bounds.
    pub fn capacity(mut self, min_size: u32, max_size: u32) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Set the initial desired size.
    pub fn desired(mut self, desired: u32) -> Self {
        self.desired_capacity = Some(desired);
        self
    }

    /// Add a request-count target-tracking rule.
    pub fn scale_on_request_count(mut self, name: &str, target_requests_per_minute: u32) -> Self {
        self.scaling_rules.push(ScalingRule {
            name: name.into(),
            target_requests_per_minute,
        });
        self
    }

    /// Add a tag propagated to instances.
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Enable or disable group metrics.
    pub fn group_metrics(mut self, enabled: bool) -> Self {
        self.group_metrics = enabled;
        self
    }

    /// Size the pool starts at.
    pub fn initial_size(&self) -> u32 {
        self.desired_capacity.unwrap_or(self.min_size)
    }
}
