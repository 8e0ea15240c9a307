use anyhow::{Context, Result};
use crossbeam_channel::{select, unbounded, Receiver};
use ipgeo::api;
use ipgeo::watch::{load_into, SnapshotWatcher, WatchInput, WatchOptions};
use ipgeo::Resolver;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Serves one query per stdin line until EOF or Ctrl+C, reloading the
/// input whenever it changes on disk.
pub fn cmd_watch(input: PathBuf, csv: bool, debounce_ms: u64) -> Result<()> {
    let kind = if csv {
        WatchInput::Csv
    } else {
        WatchInput::Snapshot
    };
    let options = WatchOptions {
        debounce: Duration::from_millis(debounce_ms),
        ..Default::default()
    };

    let resolver = Arc::new(Resolver::new());
    load_into(&resolver, &input, kind, &options.build)
        .with_context(|| format!("Failed to load: {}", input.display()))?;

    let watcher = SnapshotWatcher::spawn(Arc::clone(&resolver), &input, kind, options)
        .with_context(|| format!("Failed to watch: {}", input.display()))?;
    log::info!("Watching {} for changes", input.display());

    let (interrupt_tx, interrupt_rx) = unbounded();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .context("Error setting Ctrl+C handler")?;

    // Blocking stdin reads live on their own thread so Ctrl+C is seen
    // without waiting for another line. The thread is left behind on exit.
    let (line_tx, line_rx) = unbounded();
    thread::Builder::new()
        .name("ipgeo-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    let stdout = io::stdout();
    let served = serve_queries(&resolver, &line_rx, &interrupt_rx, &mut stdout.lock());

    log::info!(
        "Stopping watcher ({} reloads, {} failures)",
        watcher.reload_count(),
        watcher.failure_count()
    );
    watcher.stop();
    served
}

/// Answer each line as a lookup envelope until the line stream ends or an
/// interrupt arrives, whichever comes first.
fn serve_queries(
    resolver: &Resolver,
    lines: &Receiver<io::Result<String>>,
    interrupt: &Receiver<()>,
    out: &mut impl Write,
) -> Result<()> {
    loop {
        select! {
            recv(interrupt) -> _ => {
                log::info!("Interrupted");
                return Ok(());
            }
            recv(lines) -> line => {
                let line = match line {
                    Ok(line) => line?,
                    // stdin closed
                    Err(_) => return Ok(()),
                };
                let query = line.trim();
                if query.is_empty() {
                    continue;
                }
                let envelope = api::lookup_envelope(resolver, query);
                writeln!(out, "{}", serde_json::to_string(&envelope)?)?;
                out.flush()?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipgeo::source::IterSource;
    use ipgeo::BuildOptions;
    use std::time::Instant;

    fn resolver() -> Resolver {
        let resolver = Resolver::new();
        resolver
            .rebuild(
                &IterSource::new(vec![vec![("cidr", "10.0.0.0/8"), ("city", "Berlin")]]),
                BuildOptions::default(),
            )
            .unwrap();
        resolver
    }

    #[test]
    fn test_interrupt_returns_while_input_is_open() {
        let resolver = resolver();
        let (_line_tx, line_rx) = unbounded::<io::Result<String>>();
        let (interrupt_tx, interrupt_rx) = unbounded();

        let interrupter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            interrupt_tx.send(()).unwrap();
        });

        let started = Instant::now();
        let mut out = Vec::new();
        serve_queries(&resolver, &line_rx, &interrupt_rx, &mut out).unwrap();
        interrupter.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(out.is_empty());
    }

    #[test]
    fn test_lines_are_answered_until_input_ends() {
        let resolver = resolver();
        let (line_tx, line_rx) = unbounded();
        let (_interrupt_tx, interrupt_rx) = unbounded();
        for line in ["10.1.2.3", "", "192.0.2.1"] {
            line_tx.send(Ok(line.to_string())).unwrap();
        }
        drop(line_tx);

        let mut out = Vec::new();
        serve_queries(&resolver, &line_rx, &interrupt_rx, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Berlin"));
        assert!(!lines[1].contains("Berlin"));
    }

    #[test]
    fn test_read_error_ends_serving() {
        let resolver = resolver();
        let (line_tx, line_rx) = unbounded();
        let (_interrupt_tx, interrupt_rx) = unbounded();
        line_tx
            .send(Err(io::Error::new(io::ErrorKind::InvalidData, "not utf-8")))
            .unwrap();

        let mut out = Vec::new();
        assert!(serve_queries(&resolver, &line_rx, &interrupt_rx, &mut out).is_err());
    }
}
