use anyhow::Result;
use ipgeo::api;
use std::path::PathBuf;

use crate::cli_utils::{open_resolver, print_json};

pub fn cmd_query(input: PathBuf, csv: bool, query: String, quiet: bool) -> Result<()> {
    let resolver = open_resolver(&input, csv)?;
    let envelope = api::lookup_envelope(&resolver, &query);

    // Exit code reflects whether anything resolved
    let found = envelope.data.iter().any(|entry| entry.found());

    if !quiet {
        print_json(&envelope)?;
    }

    std::process::exit(if found { 0 } else { 1 });
}
