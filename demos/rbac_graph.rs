//! # Role Hierarchy Example
//!
//! This example builds the graph of a small RBAC policy with a domain,
//! an explicit deny rule and an accidental inheritance loop.
//!
//! To run this example:
//! ```
//! cargo run --example rbac_graph
//! ```

use policy_graph::*;

const POLICY: &str = "\
# permissions
p, data1_admin, data1, read
p, data1_admin, data1, write
p, data2_admin, data2, read, tenant1
p, bob, data2, write, deny

# role inheritance
g, alice, data1_admin
g, data1_admin, super_admin
g, data2_admin, super_admin
g, bob, data2_admin
g, super_admin, data1_admin

# resource groups
g2, data1, data_group
g2, data2, data_group

p, incomplete_rule
";

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Policy Graph Example ===\n");

    let graph = GraphBuilder::new().build(POLICY);

    println!("Relations by type:");
    for (relation_type, relations) in graph.connections.iter() {
        println!("  {}: {}", relation_type, relations.len());
    }
    println!();

    println!("Hierarchy:");
    println!("{}", graph);
    println!();

    if !graph.skipped.is_empty() {
        println!("Skipped lines:");
        for skipped in &graph.skipped {
            println!("  {}", skipped);
        }
        println!();
    }

    // The same policy scanned with a single visited set, for comparison.
    let shared = GraphBuilder::new()
        .cycle_scan(CycleScan::Shared)
        .build(POLICY);
    println!(
        "Cycles found: {} (shared visited set: {})",
        graph.cycles.len(),
        shared.cycles.len()
    );

    println!("\nHighlighted rules:");
    for line in POLICY.lines().filter(|line| !line.trim().is_empty()) {
        let rendered: Vec<String> = tokenize_line(line)
            .into_iter()
            .filter(|token| token.kind != TokenKind::Separator)
            .map(|token| match token.kind {
                TokenKind::RuleType => format!("<{}>", token.text),
                TokenKind::Effect => format!("!{}", token.text),
                _ => token.text.to_string(),
            })
            .collect();
        println!("  {}", rendered.join(" "));
    }
}
