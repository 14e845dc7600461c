//! # stack-engine
//!
//! Provisioning and fault-injection engine for chaos-stack.
//!
//! This crate interprets the pure graph and state machines of `stack-core`
//! against a [`CloudProvider`]:
//!
//! - [`Provisioner`] - idempotent, wave-parallel apply, destroy and drift detection
//! - [`ExperimentRunner`] - drives one experiment run to a terminal state
//! - [`StopConditionMonitor`] - polls stop-condition alarms
//! - [`StateStore`] - logical-to-physical mapping, persisted as JSON
//! - [`SimulatedCloud`] - in-process provider for dry runs and tests
//!
//! ## Design Philosophy
//!
//! The engine owns every side effect. It never decides *what* should happen
//! (that is `stack-core`'s job); it only executes, observes and reports.
//!
//! ## Example
//!
//! ```ignore
//! let cloud = Arc::new(SimulatedCloud::new(env.clone()));
//! let stack = chaos_stack(env, &ChaosStackProps::default())?;
//! let state = StateStore::new();
//!
//! Provisioner::new(cloud.clone(), state.clone(), EngineConfig::default())
//!     .apply(&stack.graph)
//!     .await
//!     .into_result()?;
//!
//! let report = ExperimentRunner::new(cloud, state, RunnerConfig::default())
//!     .run(&stack.graph, &stack.experiment)
//!     .await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod monitor;
pub mod provider;
pub mod provisioner;
pub mod report;
pub mod runner;
pub mod state;

pub use config::{EngineConfig, RunnerConfig, SimulationConfig};
pub use error::{EngineError, Result};
pub use monitor::{wait_for_alarm, PollOutcome, StopConditionMonitor};
pub use provider::{
    CloudProvider, CreateRequest, ListenerDescription, LiveResource, LoadBalancerDescription,
    ProviderError, ResourceRecord, Session, SimulatedCloud, TargetHealth, TargetHealthState,
};
pub use provisioner::{ApplyReport, DriftFinding, DriftKind, Provisioner, ResourceOutcome};
pub use report::RunReport;
pub use runner::ExperimentRunner;
pub use state::{StateEntry, StateStore};
