//! # stack-core
//!
//! Pure logic for chaos-stack (no I/O, instant tests).
//!
//! This crate turns resource declarations into a validated, ordered stack
//! graph and implements the algorithms the engine drives at run time:
//! alarm evaluation, target selection, the experiment run state machine and
//! scaling arithmetic.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. The actual provisioning and fault injection are
//! performed by `stack-engine`, which interprets the graph and the directives
//! produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alarm;
pub mod blueprint;
pub mod experiment;
pub mod graph;
pub mod policy;
pub mod scaling;
pub mod selector;
pub mod synth;
pub mod validate;

pub use alarm::{AlarmEvaluator, AlarmTransition};
pub use blueprint::{chaos_stack, ChaosStack, ChaosStackProps};
pub use experiment::{Directive, ExperimentEvent, ExperimentStatus, FailureClass};
pub use graph::{Node, StackBuilder, StackGraph};
pub use policy::{check_least_privilege, policy_document, required_grants, Grant, PolicyViolation};
pub use scaling::desired_capacity;
pub use selector::{select, InstanceSnapshot};
pub use synth::synthesize;
