//! Chaos scenarios for chaos-stack.
//!
//! - `provisioning` - apply, reapply, drift, restart and teardown
//! - `experiment` - target selection, blast radius and pool healing
//! - `interlock` - stop conditions and authorization failures
//!
//! All scenarios run against the simulated cloud on a paused clock.

pub mod experiment;
pub mod interlock;
pub mod provisioning;
