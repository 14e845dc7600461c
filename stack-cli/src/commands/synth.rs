//! Render the deployment template.

use anyhow::{Context, Result};
use std::path::Path;

use stack_core::synthesize;

use super::build_stack;
use crate::config::Config;

/// Run the synth command.
pub async fn run(config: &Config, output: Option<&Path>) -> Result<()> {
    let stack = build_stack(config)?;
    let template = synthesize(&stack.graph);
    let content = serde_json::to_string_pretty(&template)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("Failed to write template to {}", path.display()))?;
            println!(
                "Wrote {} resources to {}",
                stack.graph.len(),
                path.display()
            );
        }
        None => println!("{}", content),
    }

    Ok(())
}
