use anyhow::{Context, Result};
use ipgeo::source::CsvSource;
use ipgeo::{BuildOptions, SnapshotBuilder};
use std::path::PathBuf;

use crate::cli_utils::format_number;

pub fn cmd_build(
    inputs: Vec<PathBuf>,
    output: PathBuf,
    source: String,
    confidence: u8,
    batch_size: usize,
) -> Result<()> {
    let options = BuildOptions::default()
        .with_default_source(source)
        .with_default_confidence(confidence)
        .with_batch_size(batch_size);

    // One builder across all inputs so (source, prefix) dedup spans files
    let mut builder = SnapshotBuilder::new(options);
    for input in &inputs {
        builder
            .load(&CsvSource::new(input))
            .with_context(|| format!("Failed to read input file: {}", input.display()))?;
    }

    let (snapshot, stats) = builder.finish()?;
    snapshot
        .save(&output)
        .with_context(|| format!("Failed to write snapshot: {}", output.display()))?;

    let (v4_nodes, v6_nodes) = snapshot.node_counts();
    println!("✓ Snapshot built successfully");
    println!("  Output:     {}", output.display());
    println!("  Rows read:  {}", format_number(stats.rows_seen as usize));
    println!("  Inserted:   {}", format_number(stats.rows_inserted as usize));
    println!("  Malformed:  {}", format_number(stats.rows_malformed as usize));
    println!("  Duplicate:  {}", format_number(stats.rows_duplicate as usize));
    println!(
        "  Trie nodes: {} (IPv4), {} (IPv6)",
        format_number(v4_nodes),
        format_number(v6_nodes)
    );
    println!("  Build time: {:.2?}", stats.elapsed);

    Ok(())
}
