//! Engine configuration.

use serde::Deserialize;
use std::time::Duration;

/// Provisioning settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Stack name, prefixed to physical names (default: "CdkChaosStack").
    #[serde(default = "default_stack_name")]
    pub stack_name: String,
    /// Resources created concurrently within one wave (default: 4).
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

/// Experiment runner settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunnerConfig {
    /// Instances terminated per action step (default: 1).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between steps in milliseconds (default: 5000).
    ///
    /// Stop conditions are polled after every pause, so this is also the
    /// longest gap between two polls.
    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u64,
    /// Seed for target ordering; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Timings of the simulated cloud.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Availability zones in the region (default: 3).
    #[serde(default = "default_region_zones")]
    pub region_zones: u8,
    /// Seconds from launch to running (default: 30).
    #[serde(default = "default_boot_secs")]
    pub boot_secs: u64,
    /// Seconds from termination request to terminated (default: 20).
    #[serde(default = "default_termination_secs")]
    pub termination_secs: u64,
    /// Terminated instances still reported before the oldest are
    /// forgotten (default: 32).
    #[serde(default = "default_terminated_retention")]
    pub terminated_retention: usize,
}

// Default value functions
fn default_stack_name() -> String {
    "CdkChaosStack".to_string()
}

fn default_max_parallel() -> usize {
    4
}

fn default_batch_size() -> usize {
    1
}

fn default_step_interval_ms() -> u64 {
    5000
}

fn default_region_zones() -> u8 {
    3
}

fn default_boot_secs() -> u64 {
    30
}

fn default_termination_secs() -> u64 {
    20
}

fn default_terminated_retention() -> usize {
    32
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack_name: default_stack_name(),
            max_parallel: default_max_parallel(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            step_interval_ms: default_step_interval_ms(),
            seed: None,
        }
    }
}

impl RunnerConfig {
    /// Pause between steps.
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            region_zones: default_region_zones(),
            boot_secs: default_boot_secs(),
            termination_secs: default_termination_secs(),
            terminated_retention: default_terminated_retention(),
        }
    }
}

impl SimulationConfig {
    /// Launch to running.
    pub fn boot_time(&self) -> Duration {
        Duration::from_secs(self.boot_secs)
    }

    /// Termination request to terminated.
    pub fn termination_time(&self) -> Duration {
        Duration::from_secs(self.termination_secs)
    }
}
