//! Show creation waves and teardown order.

use anyhow::Result;

use super::build_stack;
use crate::config::Config;

/// Run the order command.
pub fn run(config: &Config) -> Result<()> {
    let stack = build_stack(config)?;
    let graph = &stack.graph;

    println!("Creation waves:");
    for (level, wave) in graph.waves().iter().enumerate() {
        let ids: Vec<&str> = wave.iter().map(|id| id.as_str()).collect();
        println!("  {}: {}", level, ids.join(", "));
    }

    println!();
    println!("Creation order:");
    for id in graph.creation_order() {
        let deps: Vec<&str> = graph.dependencies_of(id).iter().map(|d| d.as_str()).collect();
        if deps.is_empty() {
            println!("  {}", id);
        } else {
            println!("  {} (after {})", id, deps.join(", "));
        }
    }

    println!();
    println!("Teardown order:");
    for id in graph.teardown_order() {
        println!("  {}", id);
    }

    Ok(())
}
