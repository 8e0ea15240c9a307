use anyhow::{Context, Result};
use ipgeo::api::{self, Envelope};
use ipgeo::{GeoError, Resolver};
use std::io::{self, Read};
use std::path::PathBuf;

use crate::cli_utils::{open_snapshot, print_json};

/// Reads a JSON array of strings from stdin and prints one envelope.
/// Rejected requests print a 400 envelope and exit with status 2.
pub fn cmd_bulk(snapshot: PathBuf) -> Result<()> {
    let resolver = Resolver::with_snapshot(open_snapshot(&snapshot)?);

    let mut body = String::new();
    io::stdin()
        .read_to_string(&mut body)
        .context("Failed to read request from stdin")?;

    let inputs: Vec<String> = match serde_json::from_str(&body) {
        Ok(inputs) => inputs,
        Err(e) => {
            let err = GeoError::InvalidInput(format!("expected a JSON array of strings: {}", e));
            return reject(&err);
        }
    };

    match api::bulk_lookup(&resolver, &inputs) {
        Ok(envelope) => print_json(&envelope),
        Err(e) => reject(&e),
    }
}

fn reject(err: &GeoError) -> Result<()> {
    print_json(&Envelope::bad_request(err))?;
    std::process::exit(2);
}
