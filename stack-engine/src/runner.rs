//! Experiment runner.
//!
//! Drives [`ExperimentStatus`] through one run:
//!
//! 1. Resolve the role, stop-condition alarms and targets. Any failure here
//!    ends the run as `FAILED` before anything is touched.
//! 2. Poll every stop condition. A breaching alarm ends the run as
//!    `STOPPED`, including before the first step.
//! 3. Terminate the next batch of targets, wait one step interval, poll
//!    again, and so on until no batch is left.
//!
//! Steps are never retried. Instances already terminating when a step runs
//! are counted as matched but not as affected.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;

use stack_core::{select, Directive, ExperimentEvent, ExperimentStatus, StackGraph};
use stack_types::{ExperimentTemplate, Handle, LogicalId, PhysicalId, FIS_SERVICE_PRINCIPAL};

use crate::config::RunnerConfig;
use crate::error::{EngineError, Result};
use crate::monitor::{PollOutcome, StopConditionMonitor};
use crate::provider::{CloudProvider, ResourceRecord, Session};
use crate::report::RunReport;
use crate::state::StateStore;

/// Everything resolved before the first step.
struct Plan<P: CloudProvider> {
    session: Session,
    monitor: StopConditionMonitor<P>,
    matched: Vec<PhysicalId>,
    steps: Vec<Vec<PhysicalId>>,
}

/// Runs experiment templates against provisioned resources.
pub struct ExperimentRunner<P: CloudProvider> {
    provider: Arc<P>,
    state: StateStore,
    config: RunnerConfig,
}

impl<P: CloudProvider> ExperimentRunner<P> {
    /// Create a runner resolving resources through `state`.
    pub fn new(provider: Arc<P>, state: StateStore, config: RunnerConfig) -> Self {
        Self {
            provider,
            state,
            config,
        }
    }

    /// Run `experiment` to a terminal state.
    pub async fn run(
        &self,
        graph: &StackGraph,
        experiment: &Handle<ExperimentTemplate>,
    ) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(experiment.id().clone());
        tracing::info!("experiment {} starting", experiment.id());

        let plan = match self.plan(graph, experiment).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!("experiment {} failed validation: {}", experiment.id(), e);
                let event = ExperimentEvent::ValidationFailed {
                    class: e.class(),
                    message: e.to_string(),
                };
                let (status, _directives) = ExperimentStatus::new().on_event(event);
                report.transitions.push(status.clone());
                report.outcome = status;
                report.elapsed_ms =
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                return report;
            }
        };
        report.matched = plan.matched.clone();

        let mut status = ExperimentStatus::new();
        let mut events = VecDeque::from([ExperimentEvent::Validated {
            total_steps: u32::try_from(plan.steps.len()).unwrap_or(u32::MAX),
        }]);
        let mut next_step = 0;
        let mut polled = false;

        while let Some(event) = events.pop_front() {
            let (next, directives) = status.clone().on_event(event);
            if next.name() != status.name() {
                tracing::info!("experiment {} {} -> {}", experiment.id(), status, next);
                report.transitions.push(next.clone());
            }
            status = next;

            for directive in directives {
                match directive {
                    Directive::PollStopConditions => {
                        if polled {
                            tokio::time::sleep(self.config.step_interval()).await;
                        }
                        polled = true;
                        events.push_back(match plan.monitor.poll().await {
                            Ok(PollOutcome::Clear) => ExperimentEvent::StopConditionsClear,
                            Ok(PollOutcome::Breached(alarm)) => {
                                tracing::warn!(
                                    "experiment {} stop condition {} breached",
                                    experiment.id(),
                                    alarm
                                );
                                ExperimentEvent::StopConditionBreached { alarm }
                            }
                            Err(e) => ExperimentEvent::StepFailed {
                                class: e.class(),
                                message: e.to_string(),
                            },
                        });
                    }
                    Directive::ExecuteNextStep => {
                        let batch = plan.steps.get(next_step).cloned().unwrap_or_default();
                        next_step += 1;
                        report.steps_executed += 1;
                        events.push_back(match self.execute(&plan.session, &batch).await {
                            Ok(affected) => {
                                tracing::info!(
                                    "experiment {} step {} terminated {:?}",
                                    experiment.id(),
                                    next_step,
                                    affected
                                );
                                report.affected.extend(affected);
                                ExperimentEvent::StepCompleted
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "experiment {} step {} failed: {}",
                                    experiment.id(),
                                    next_step,
                                    e
                                );
                                ExperimentEvent::StepFailed {
                                    class: e.class(),
                                    message: e.to_string(),
                                }
                            }
                        });
                    }
                    Directive::Finish => {}
                }
            }
        }

        report.outcome = status;
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            "experiment {} finished {} ({} of {} targets affected)",
            experiment.id(),
            report.outcome,
            report.affected.len(),
            report.matched.len()
        );
        report
    }

    async fn execute(&self, session: &Session, batch: &[PhysicalId]) -> Result<Vec<PhysicalId>> {
        Ok(self.provider.terminate_instances(session, batch).await?)
    }

    fn resolve(&self, id: &LogicalId) -> Result<ResourceRecord> {
        self.state
            .record(id)
            .ok_or_else(|| EngineError::GraphResolution(format!("{} is not provisioned", id)))
    }

    async fn plan(
        &self,
        graph: &StackGraph,
        experiment: &Handle<ExperimentTemplate>,
    ) -> Result<Plan<P>> {
        let template = graph.get(experiment).ok_or_else(|| {
            EngineError::GraphResolution(format!("{} is not in the graph", experiment.id()))
        })?;

        let role = self.resolve(template.role.id())?;
        let session = self
            .provider
            .assume_role(&role.arn, FIS_SERVICE_PRINCIPAL)
            .await?;

        let mut alarms = Vec::with_capacity(template.stop_conditions.len());
        for condition in &template.stop_conditions {
            let alarm = self.resolve(condition.alarm.id())?;
            alarms.push((condition.alarm.id().clone(), alarm.physical_id));
        }
        let monitor = StopConditionMonitor::new(Arc::clone(&self.provider), alarms);

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let batch_size = self.config.batch_size.max(1);
        let mut matched = Vec::new();
        let mut steps = Vec::new();
        for (name, action) in &template.actions {
            let selector = template.targets.get(&action.target_binding).ok_or_else(|| {
                EngineError::GraphResolution(format!(
                    "action {} is bound to unknown target {}",
                    name, action.target_binding
                ))
            })?;
            let pool = self.resolve(selector.pool.id())?;
            let instances = self.provider.describe_instances(&pool.physical_id).await?;
            let mut targets: Vec<PhysicalId> =
                select(selector, &pool.physical_id, &instances, &mut rng)
                    .into_iter()
                    .map(|i| i.id)
                    .collect();
            targets.shuffle(&mut rng);
            tracing::info!(
                "action {} matched {} of {} instances in {}",
                name,
                targets.len(),
                instances.len(),
                pool.physical_id
            );
            steps.extend(targets.chunks(batch_size).map(|c| c.to_vec()));
            matched.extend(targets);
        }

        Ok(Plan {
            session,
            monitor,
            matched,
            steps,
        })
    }
}
