//! diskscope — headless driver for the disk-usage analyzer core.
//!
//! Thin binary entry point: scans a target, prints the largest entries,
//! and optionally keeps watching the tree for deletions and creations.
//! All logic lives in the `diskscope-core` crate.

use anyhow::bail;
use clap::Parser;
use diskscope_core::controller::{Controller, ControllerEvent};
use diskscope_core::model::size::{format_count, format_size, percent};
use diskscope_core::scanner::{CancelFlag, SizeMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(name = "diskscope", version, about = "Disk usage analyzer")]
struct Cli {
    /// Directory or mount point to scan. Falls back to the saved default
    /// target when omitted.
    target: Option<PathBuf>,

    /// List mounted volumes and exit.
    #[arg(long)]
    list: bool,

    /// Scan worker threads (0 = default).
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Report logical file lengths instead of apparent disk usage.
    #[arg(long)]
    logical: bool,

    /// After scanning, watch the tree for this many seconds and report
    /// deletions and creations.
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    watch: u64,

    /// How many of the largest entries to print.
    #[arg(long, default_value_t = 15)]
    top: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let controller = Arc::new(Controller::new(cli.target.clone()));

    if cli.list {
        print_volumes(&controller);
        return Ok(());
    }
    if cli.target.is_none() && !controller.has_saved_target() {
        print_volumes(&controller);
        println!("\nPass a path (or scan a volume root) to begin.");
        return Ok(());
    }

    if cli.logical {
        controller.set_size_mode(SizeMode::Logical);
    }
    controller.set_scan_workers(cli.workers);

    let cancel = CancelFlag::new();
    let events = controller.start_scan(cancel)?;

    let mut scan_result = None;
    for event in events.iter() {
        match event {
            ControllerEvent::ScanStarted { path } => {
                println!("Scanning {} ...", path.display());
            }
            ControllerEvent::ScanProgress {
                files_scanned,
                bytes_found,
                ..
            } => {
                eprint!(
                    "\r  {} files, {}     ",
                    format_count(files_scanned),
                    format_size(bytes_found)
                );
            }
            ControllerEvent::ScanPhaseChanged { phase } => {
                eprintln!("\r{phase}");
            }
            ControllerEvent::ScanCompleted { result } => {
                scan_result = Some(result);
            }
            _ => {}
        }
    }
    controller.finalize_scan();

    let Some(result) = scan_result else {
        bail!("scan ended without a completion event");
    };
    let shared = result?;

    {
        let tree = shared.read();
        let root = tree.root();
        let total = tree.total_size();
        println!(
            "\n{}  {}  ({} entries)",
            tree.root_path().display(),
            format_size(total),
            format_count(tree.len() as u64)
        );
        for child in tree.sorted_children(root).into_iter().take(cli.top) {
            let node = tree.node(child);
            let marker = if node.is_dir { "/" } else { "" };
            println!(
                "  {:>10}  {:>5.1}%  {}{marker}",
                format_size(node.size),
                percent(node.size, total),
                node.name
            );
        }
    }

    if cli.watch > 0 {
        watch_for(&controller, Duration::from_secs(cli.watch))?;
    }

    controller.stop();
    Ok(())
}

fn print_volumes(controller: &Controller) {
    let volumes = controller.volumes();
    if volumes.is_empty() {
        println!("No scannable volumes found.");
        return;
    }
    println!("Mounted volumes:");
    for (i, volume) in volumes.iter().enumerate() {
        println!("  [{i}] {}", volume.summary());
    }
}

fn watch_for(controller: &Arc<Controller>, duration: Duration) -> anyhow::Result<()> {
    let events = controller.start_watching()?;
    println!("\nWatching for changes ({}s) ...", duration.as_secs());
    let deadline = Instant::now() + duration;

    while let Some(remaining) = deadline
        .checked_duration_since(Instant::now())
        .filter(|d| !d.is_zero())
    {
        match events.recv_timeout(remaining) {
            Ok(ControllerEvent::DeletionDetected {
                path,
                size,
                session_freed,
                lifetime_freed,
                ..
            }) => {
                println!(
                    "  deleted {}  (-{}; session {}, lifetime {})",
                    path.display(),
                    format_size(size),
                    format_size(session_freed),
                    format_size(lifetime_freed)
                );
            }
            Ok(ControllerEvent::CreationDetected { path, disk_free }) => {
                println!(
                    "  new entries under {}  ({} free)",
                    path.display(),
                    format_size(disk_free)
                );
            }
            Ok(ControllerEvent::Error { error }) => {
                eprintln!("  watch unavailable: {error}");
                break;
            }
            Ok(_) => {}
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => break,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    let freed = controller.freed_state();
    println!(
        "Reclaimed this session: {}  (lifetime {})",
        format_size(freed.session),
        format_size(freed.lifetime)
    );
    Ok(())
}
