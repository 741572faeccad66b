//! Replay a JSON-lines view log into a window store and report on it.
//!
//! ```text
//! view-windows <events.jsonl> [config.toml] [--period <name>] [--snapshot] [--json-logs]
//! ```
//!
//! Each input line is `{"subjectId": .., "userId": .., "timestamp": ..}`.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{info, warn};
use view_windows::observability::init_tracing;
use view_windows::workers::{event_channel, IngestWorker};
use view_windows::{AggregatorConfig, TargetPeriod, ViewEvent, WindowStore};

const USAGE: &str =
    "usage: view-windows <events.jsonl> [config.toml] [--period <name>] [--snapshot] [--json-logs]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().collect();

    init_tracing(args.iter().any(|s| s == "--json-logs"))?;

    let positional: Vec<&String> = args
        .iter()
        .skip(1)
        .scan(false, |skip_next, arg| {
            let was_flag_value = *skip_next;
            *skip_next = arg == "--period";
            Some((was_flag_value, arg))
        })
        .filter(|(was_flag_value, arg)| !was_flag_value && !arg.starts_with("--"))
        .map(|(_, arg)| arg)
        .collect();

    let events_path = match positional.first() {
        Some(path) => PathBuf::from(path.as_str()),
        None => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };
    let period: TargetPeriod = args
        .iter()
        .position(|s| s == "--period")
        .and_then(|i| args.get(i + 1))
        .map(|s| TargetPeriod::from(s.as_str()))
        .unwrap_or(TargetPeriod::Day);
    let print_snapshot = args.iter().any(|s| s == "--snapshot");

    let config = match positional.get(1) {
        Some(path) => AggregatorConfig::from_file(path.as_str())?,
        None => AggregatorConfig::from_env()?,
    };
    info!(
        window_size_minutes = config.window_size_minutes,
        max_windows_to_keep = config.max_windows_to_keep,
        "starting replay"
    );

    let store = WindowStore::new(config)?;
    let (sender, receiver) = event_channel();
    let (worker, _handle) = IngestWorker::new(store.clone(), receiver);
    let worker_task = tokio::spawn(worker.run());

    let reader = BufReader::new(std::fs::File::open(&events_path)?);
    let mut malformed = 0u64;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ViewEvent>(&line) {
            Ok(event) => sender.send(event)?,
            Err(e) => {
                malformed += 1;
                warn!(line = line_no + 1, "skipping malformed event: {}", e);
            }
        }
    }
    drop(sender);

    let stats = worker_task.await?;
    println!("View Window Replay");
    println!("==================");
    println!("  Events applied:  {}", stats.applied);
    println!("  Events rejected: {}", stats.rejected + malformed);
    println!("  Subjects:        {}", store.subject_count());
    println!();

    for subject in store.subjects() {
        let windows = store.windows_for_subject(&subject);
        let (first, last) = match (windows.first(), windows.last()) {
            (Some(first), Some(last)) => (first.start_time, last.end_time),
            _ => continue,
        };

        println!("Subject {}", subject);
        for window in &windows {
            println!(
                "  [{} .. {})  views={:<6} users={:<6} last={}",
                window.start_time,
                window.end_time,
                window.metrics.total_views,
                window.metrics.unique_users,
                window.last_updated
            );
        }

        let metrics = store.aggregated_metrics(&subject, first, last);
        println!(
            "  total: windows={} views={} users~{} (raw {})",
            metrics.windows_count,
            metrics.total_views,
            metrics.unique_users_estimate,
            metrics.unique_users_count
        );
        if let Some(compressed) = store.compress_windows(&subject, first, last, &period) {
            println!(
                "  as one {}: views={} users~{}",
                period, compressed.total_views, compressed.unique_users
            );
        }
        println!();
    }

    if print_snapshot {
        println!("{}", store.serialize_json()?);
    }

    Ok(())
}
