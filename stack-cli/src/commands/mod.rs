//! CLI command implementations.

pub mod order;
pub mod simulate;
pub mod synth;
pub mod validate;

use anyhow::{Context, Result};
use stack_core::{chaos_stack, ChaosStack};

use crate::config::Config;

/// Build the stack described by `config`.
pub fn build_stack(config: &Config) -> Result<ChaosStack> {
    let env = config.environment().context("Invalid environment")?;
    chaos_stack(env, &config.stack_props()).context("Stack validation failed")
}
