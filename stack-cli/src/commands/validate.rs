//! Build the stack and check every invariant.

use anyhow::Result;

use stack_core::policy::required_grants;

use super::build_stack;
use crate::config::Config;

/// Run the validate command.
pub fn run(config: &Config) -> Result<()> {
    let stack = build_stack(config)?;
    let env = stack.graph.environment();

    println!("Stack {} in {}/{}", config.engine.stack_name, env.account, env.region);
    for node in stack.graph.nodes() {
        println!(
            "  ok  {:<18} {}",
            node.id.as_str(),
            node.declaration.kind().cloudformation_type()
        );
    }

    if let Some(template) = stack.graph.get(&stack.experiment) {
        println!();
        println!("Role {} grants exactly:", stack.role.id());
        for grant in required_grants(template, env) {
            println!("  {} on {}", grant.action, grant.resource);
        }
    }

    println!();
    println!("{} resources valid", stack.graph.len());
    Ok(())
}
