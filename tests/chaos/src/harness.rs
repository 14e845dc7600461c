//! Chaos test harness: one chaos stack in its own simulated cloud.
//!
//! Wraps the simulated cloud, the state store, the provisioner and the
//! experiment runner, and provides methods for:
//! - Applying the stack and waiting for the pool to boot
//! - Running the experiment
//! - Breaching the stop condition
//! - Collecting pool and load balancer state for assertions

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stack_core::{chaos_stack, ChaosStack, ChaosStackProps};
use stack_engine::{
    wait_for_alarm, ApplyReport, CloudProvider, EngineConfig, EngineError, ExperimentRunner,
    LoadBalancerDescription, ProviderError, Provisioner, RunReport, RunnerConfig,
    SimulatedCloud, SimulationConfig, StateStore, TargetHealth,
};
use stack_types::{
    AlarmState, Environment, LogicalId, PhysicalId, ValidationError,
    TERMINATING_INSTANCES_METRIC,
};
use thiserror::Error;

use crate::assertions::{assert_pool_healed, PoolState};

/// Account every harness provisions into.
pub const TEST_ACCOUNT: &str = "123456789012";
/// Region every harness provisions into.
pub const TEST_REGION: &str = "eu-north-1";

/// Errors that can occur during chaos harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The stack failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The engine reported an error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The simulated cloud rejected a call.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A resource the scenario needs is not in the state store.
    #[error("{0} is not provisioned")]
    NotProvisioned(LogicalId),

    /// Timeout waiting for the stack to reach a state.
    #[error("timeout waiting for {0}")]
    Timeout(String),
}

/// High-level chaos test orchestrator.
pub struct ChaosHarness {
    /// Unique stack name for test isolation.
    stack_name: String,
    cloud: Arc<SimulatedCloud>,
    stack: ChaosStack,
    state: StateStore,
    runner: RunnerConfig,
    simulation: SimulationConfig,
    min_size: u32,
}

impl ChaosHarness {
    /// Build the stack from `props`. Nothing is provisioned yet.
    pub fn new(props: ChaosStackProps) -> Result<Self, HarnessError> {
        let env = Environment::new(TEST_ACCOUNT, TEST_REGION)?;
        let stack_name = format!("chaos-{}", &uuid::Uuid::new_v4().as_simple().to_string()[..12]);
        let simulation = SimulationConfig::default();
        let cloud = Arc::new(SimulatedCloud::with_config(env.clone(), simulation.clone()));
        let stack = chaos_stack(env, &props)?;

        Ok(Self {
            stack_name,
            cloud,
            stack,
            state: StateStore::new(),
            runner: RunnerConfig::default(),
            simulation,
            min_size: props.pool.min_size,
        })
    }

    /// Build the default stack.
    pub fn default_stack() -> Result<Self, HarnessError> {
        Self::new(ChaosStackProps::default())
    }

    /// Use `runner` for experiment runs.
    pub fn with_runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }

    /// Get the unique stack name.
    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    /// The declared stack.
    pub fn stack(&self) -> &ChaosStack {
        &self.stack
    }

    /// The simulated cloud, for fault injection.
    pub fn cloud(&self) -> &Arc<SimulatedCloud> {
        &self.cloud
    }

    /// The state store shared by every engine this harness creates.
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// A provisioner over this harness's cloud and state.
    pub fn provisioner(&self) -> Provisioner<SimulatedCloud> {
        self.provisioner_with(self.state.clone())
    }

    /// A provisioner over this harness's cloud and another state store.
    pub fn provisioner_with(&self, state: StateStore) -> Provisioner<SimulatedCloud> {
        let config = EngineConfig {
            stack_name: self.stack_name.clone(),
            ..EngineConfig::default()
        };
        Provisioner::new(self.cloud.clone(), state, config)
    }

    /// Apply the stack, failing on any resource error.
    pub async fn apply(&self) -> Result<ApplyReport, HarnessError> {
        let report = self.provisioner().apply(&self.stack.graph).await.into_result()?;
        tracing::info!("{} applied: {} created", self.stack_name, report.created().len());
        Ok(report)
    }

    /// Apply the stack and wait until the pool's first instances are running.
    pub async fn apply_and_boot(&self) -> Result<ApplyReport, HarnessError> {
        let report = self.apply().await?;
        tokio::time::sleep(self.simulation.boot_time() + Duration::from_secs(1)).await;
        Ok(report)
    }

    /// Tear the stack down, returning deleted logical IDs in order.
    pub async fn destroy(&self) -> Result<Vec<LogicalId>, HarnessError> {
        Ok(self.provisioner().destroy(&self.stack.graph).await?)
    }

    /// Run the experiment once.
    pub async fn run_experiment(&self) -> RunReport {
        ExperimentRunner::new(self.cloud.clone(), self.state.clone(), self.runner.clone())
            .run(&self.stack.graph, &self.stack.experiment)
            .await
    }

    /// Physical ID of a provisioned resource.
    pub fn physical_id(&self, id: &LogicalId) -> Result<PhysicalId, HarnessError> {
        self.state
            .record(id)
            .map(|r| r.physical_id)
            .ok_or_else(|| HarnessError::NotProvisioned(id.clone()))
    }

    /// Current pool membership.
    pub async fn pool_state(&self) -> Result<PoolState, HarnessError> {
        let pool = self.physical_id(self.stack.pool.id())?;
        let instances = self.cloud.describe_instances(&pool).await?;
        Ok(PoolState {
            pool,
            min_size: self.min_size,
            instances,
        })
    }

    /// The load balancer as the cloud reports it.
    pub async fn load_balancer(&self) -> Result<LoadBalancerDescription, HarnessError> {
        let lb = self.physical_id(self.stack.balancer.id())?;
        Ok(self.cloud.describe_load_balancer(&lb).await?)
    }

    /// Health of every load balancer target.
    pub async fn target_health(&self) -> Result<Vec<TargetHealth>, HarnessError> {
        let lb = self.physical_id(self.stack.balancer.id())?;
        Ok(self.cloud.describe_target_health(&lb).await?)
    }

    /// Current state of the stop-condition alarm.
    pub async fn alarm_state(&self) -> Result<AlarmState, HarnessError> {
        let alarm = self.physical_id(self.stack.alarm.id())?;
        Ok(self.cloud.describe_alarm(&alarm).await?)
    }

    /// Publish `value` terminating instances and wait for the alarm to react.
    ///
    /// Returns whether the alarm reached `ALARM`.
    pub async fn breach_stop_condition(&self, value: f64) -> Result<bool, HarnessError> {
        let pool = self.physical_id(self.stack.pool.id())?;
        self.cloud
            .put_metric(&pool, TERMINATING_INSTANCES_METRIC, value)
            .await?;
        self.wait_for_alarm(AlarmState::Alarm, Duration::from_secs(60))
            .await
    }

    /// Wait for the alarm to reach `expected`.
    pub async fn wait_for_alarm(
        &self,
        expected: AlarmState,
        timeout: Duration,
    ) -> Result<bool, HarnessError> {
        let alarm = self.physical_id(self.stack.alarm.id())?;
        Ok(wait_for_alarm(
            self.cloud.as_ref(),
            &alarm,
            expected,
            timeout,
            Duration::from_secs(1),
        )
        .await?)
    }

    /// Wait until the pool is back at full strength.
    pub async fn wait_for_heal(&self, timeout: Duration) -> Result<PoolState, HarnessError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let pool = self.pool_state().await?;
            if assert_pool_healed(&pool).passed {
                return Ok(pool);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(HarnessError::Timeout(format!("pool {} to heal", pool.pool)));
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    /// Save the state store to `path`.
    pub async fn save_state(&self, path: &Path) -> Result<(), HarnessError> {
        Ok(self.state.save(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_names_are_unique() {
        let a = ChaosHarness::default_stack().unwrap();
        let b = ChaosHarness::default_stack().unwrap();
        assert_ne!(a.stack_name(), b.stack_name());
        assert!(a.stack_name().starts_with("chaos-"));
    }

    #[test]
    fn invalid_props_are_rejected() {
        let mut props = ChaosStackProps::default();
        props.pool.min_size = 9;
        assert!(matches!(
            ChaosHarness::new(props),
            Err(HarnessError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_provisioned_before_apply() {
        let harness = ChaosHarness::default_stack().unwrap();
        let err = harness.pool_state().await.unwrap_err();
        assert!(matches!(err, HarnessError::NotProvisioned(_)));
    }
}
