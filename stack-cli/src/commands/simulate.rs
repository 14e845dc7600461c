//! Dry-run the whole lifecycle against a simulated cloud.
//!
//! Runs on virtual time: every boot, probe and alarm period elapses
//! instantly.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stack_core::InstanceSnapshot;
use stack_engine::{
    wait_for_alarm, CloudProvider, ExperimentRunner, Provisioner, RunReport, SimulatedCloud,
    StateStore,
};
use stack_types::{
    AlarmState, InstanceState, LogicalId, PhysicalId, TERMINATING_INSTANCES_METRIC,
};

use super::build_stack;
use crate::config::Config;

/// Heal checks before giving up on the pool.
const HEAL_ATTEMPTS: u32 = 12;

/// Flags of the simulate command.
#[derive(Debug, Default)]
pub struct SimulateOptions {
    /// Breach the stop condition before the experiment starts.
    pub breach: bool,
    /// Skip teardown.
    pub keep: bool,
    /// Print the run report as JSON.
    pub json: bool,
    /// Where to write the provisioning state.
    pub state_out: Option<PathBuf>,
}

/// Run the simulate command.
pub async fn run(config: &Config, options: SimulateOptions) -> Result<()> {
    let stack = build_stack(config)?;
    let env = stack.graph.environment().clone();
    let cloud = Arc::new(SimulatedCloud::with_config(env, config.simulation.clone()));
    let state = StateStore::new();
    let provisioner = Provisioner::new(cloud.clone(), state.clone(), config.engine.clone());

    println!("=== apply {} ===", config.engine.stack_name);
    let applied = provisioner
        .apply(&stack.graph)
        .await
        .into_result()
        .context("Apply failed")?;
    for (id, outcome) in &applied.resources {
        println!("  {:<18} {:?}", id.as_str(), outcome);
    }
    for (name, value) in provisioner.outputs(&stack.graph)? {
        println!("  output {} = {}", name, value);
    }

    let pool = physical_id(&state, stack.pool.id())?;
    let alarm = physical_id(&state, stack.alarm.id())?;

    // Let the pool boot before anything is targeted.
    tokio::time::sleep(config.simulation.boot_time() + Duration::from_secs(1)).await;

    if options.breach {
        println!();
        println!("=== breach {} ===", stack.alarm.id());
        cloud
            .put_metric(&pool, TERMINATING_INSTANCES_METRIC, config.alarm.threshold)
            .await?;
        let period = Duration::from_secs(config.alarm.period_secs);
        let fired = wait_for_alarm(
            cloud.as_ref(),
            &alarm,
            AlarmState::Alarm,
            period * 2,
            Duration::from_secs(1),
        )
        .await?;
        println!("  alarm in ALARM: {}", fired);
    }

    println!();
    println!("=== run {} ===", stack.experiment.id());
    let runner = ExperimentRunner::new(cloud.clone(), state.clone(), config.runner.clone());
    let report = runner.run(&stack.graph, &stack.experiment).await;
    print_report(&report, options.json)?;

    println!();
    println!("=== pool {} ===", pool);
    let healed = wait_for_heal(cloud.as_ref(), &pool, config).await?;
    println!("  healed: {}", healed);

    if let Some(path) = &options.state_out {
        state.save(path).await?;
        println!("  state written to {}", path.display());
    }

    if !options.keep {
        println!();
        println!("=== destroy ===");
        let destroyed = provisioner.destroy(&stack.graph).await?;
        for id in destroyed {
            println!("  {}", id);
        }
    }

    if let Some((class, message)) = report.failure() {
        bail!("Experiment failed ({}): {}", class, message);
    }
    Ok(())
}

fn physical_id(state: &StateStore, id: &LogicalId) -> Result<PhysicalId> {
    state
        .record(id)
        .map(|r| r.physical_id)
        .with_context(|| format!("{} is not provisioned", id))
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("  status:   {}", report.status_names().join(" -> "));
    println!("  matched:  {}", report.matched.len());
    println!("  affected: {}", report.affected.len());
    println!("  steps:    {}", report.steps_executed);
    println!("  elapsed:  {}s", report.elapsed_ms / 1000);
    if let Some(alarm) = report.stopped_by() {
        println!("  stopped by {}", alarm);
    }
    if let Some((class, message)) = report.failure() {
        println!("  failure ({}): {}", class, message);
    }
    Ok(())
}

/// Wait until the pool is back at its minimum size with every instance running.
async fn wait_for_heal<P: CloudProvider>(
    provider: &P,
    pool: &PhysicalId,
    config: &Config,
) -> Result<bool> {
    let interval = config.simulation.termination_time() + config.simulation.boot_time();
    for _ in 0..HEAL_ATTEMPTS {
        let instances = provider.describe_instances(pool).await?;
        if is_healed(&instances, config.pool.min_size) {
            for instance in &instances {
                println!("  {} {}", instance.id, instance.state);
            }
            return Ok(true);
        }
        tokio::time::sleep(interval).await;
    }
    Ok(false)
}

/// Every instance is running and there are at least `min_size` of them.
fn is_healed(instances: &[InstanceSnapshot], min_size: u32) -> bool {
    let running = instances
        .iter()
        .filter(|i| i.state == InstanceState::Running)
        .count();
    let min_size = usize::try_from(min_size).unwrap_or(usize::MAX);
    running >= min_size && running == instances.len()
}
