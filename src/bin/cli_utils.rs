use anyhow::{Context, Result};
use ipgeo::source::CsvSource;
use ipgeo::{BuildOptions, Resolver, Snapshot};
use serde::Serialize;
use std::path::Path;

/// Logs go to stderr so stdout stays machine-readable.
/// `RUST_LOG` overrides the level chosen here.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_target(false)
        .init();
}

pub fn open_snapshot(path: &Path) -> Result<Snapshot> {
    Snapshot::open(path).with_context(|| format!("Failed to load snapshot: {}", path.display()))
}

/// Resolver serving either a saved snapshot or a fresh build of a CSV file
pub fn open_resolver(input: &Path, csv: bool) -> Result<Resolver> {
    if csv {
        let resolver = Resolver::new();
        resolver
            .rebuild(&CsvSource::new(input), BuildOptions::default())
            .with_context(|| format!("Failed to build from CSV: {}", input.display()))?;
        Ok(resolver)
    } else {
        Ok(Resolver::with_snapshot(open_snapshot(input)?))
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

pub fn format_unix_timestamp(timestamp: u64) -> String {
    let days = timestamp / 86400;
    let secs = timestamp % 86400;
    let (year, month, day) = days_to_ymd(days);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        year,
        month,
        day,
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

// Days since 1970-01-01 to (year, month, day)
fn days_to_ymd(mut days: u64) -> (u64, u64, u64) {
    let mut year = 1970;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }

    let february = if is_leap_year(year) { 29 } else { 28 };
    let days_in_months = [31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let mut month = 1;
    for days_in_month in days_in_months {
        if days < days_in_month {
            break;
        }
        days -= days_in_month;
        month += 1;
    }
    (year, month, days + 1)
}

fn is_leap_year(year: u64) -> bool {
    (year.is_multiple_of(4) && !year.is_multiple_of(100)) || year.is_multiple_of(400)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_format_unix_timestamp() {
        assert_eq!(format_unix_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_unix_timestamp(951782400), "2000-02-29 00:00:00 UTC");
        assert_eq!(format_unix_timestamp(1700000000), "2023-11-14 22:13:20 UTC");
    }
}
