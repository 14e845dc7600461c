//! # chaos-tests
//!
//! End-to-end chaos scenarios for chaos-stack.
//!
//! Every scenario provisions the full stack into a [`SimulatedCloud`],
//! injects faults and checks the outcome with the pure helpers in
//! [`assertions`]. Scenarios run on a paused tokio clock, so instance boots,
//! health probes and alarm periods elapse instantly.
//!
//! [`SimulatedCloud`]: stack_engine::SimulatedCloud

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod harness;

pub mod scenarios;
