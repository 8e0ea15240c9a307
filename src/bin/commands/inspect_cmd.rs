use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_number, format_unix_timestamp, open_snapshot};

pub fn cmd_inspect(snapshot_path: PathBuf, json_output: bool) -> Result<()> {
    let snapshot = open_snapshot(&snapshot_path)?;
    let meta = snapshot.meta();
    let (v4_nodes, v6_nodes) = snapshot.node_counts();
    let source_counts = snapshot.source_counts();

    if json_output {
        let output = json!({
            "file": snapshot_path.display().to_string(),
            "records": snapshot.len(),
            "ipv4_nodes": v4_nodes,
            "ipv6_nodes": v6_nodes,
            "sources": source_counts,
            "built_at": meta.built_at,
            "built_from": meta.source,
            "stats": meta.stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Snapshot: {}", snapshot_path.display());
    println!("Records:  {}", format_number(snapshot.len()));
    println!();
    println!("Index:");
    println!("  IPv4 nodes:      {}", format_number(v4_nodes));
    println!("  IPv6 nodes:      {}", format_number(v6_nodes));

    if !source_counts.is_empty() {
        println!();
        println!("Sources:");
        for (source, count) in &source_counts {
            println!("  {:<16} {}", source, format_number(*count));
        }
    }

    println!();
    println!("Build:");
    println!(
        "  Built at:        {} ({})",
        format_unix_timestamp(meta.built_at),
        meta.built_at
    );
    if !meta.source.is_empty() {
        println!("  Built from:      {}", meta.source);
    }
    println!("  Rows read:       {}", format_number(meta.stats.rows_seen as usize));
    println!(
        "  Rows skipped:    {} ({} malformed, {} duplicate)",
        format_number(meta.stats.rows_skipped() as usize),
        format_number(meta.stats.rows_malformed as usize),
        format_number(meta.stats.rows_duplicate as usize)
    );

    Ok(())
}
