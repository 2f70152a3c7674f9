//! sizetree - Parallel directory size aggregation.
//!
//! Usage:
//!   sizetree scan [PATH]     Scan and show a size-sorted tree
//!   sizetree export [PATH]   Export scan to JSON
//!   sizetree --help          Show help

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sizetree_core::FileNode;
use sizetree_scan::{FileTree, ScanConfig, ScanProgress, ScanSession};

#[derive(Parser)]
#[command(
    name = "sizetree",
    version,
    about = "Parallel directory size aggregation",
    long_about = "sizetree walks a directory tree in parallel and reports how much \
                  space every directory takes, including all of its descendants."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory and show a summary
    Scan {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// Number of top entries to show per directory
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Export scan results to JSON
    Export {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export the whole tree with stats and warnings, not just the root node
        #[arg(long)]
        full: bool,

        #[command(flatten)]
        scan: ScanArgs,
    },
}

/// Options shared by every command that scans.
#[derive(clap::Args)]
struct ScanArgs {
    /// Worker threads (0 = twice the number of cores)
    #[arg(short, long, default_value = "0")]
    jobs: usize,

    /// Follow symbolic links to directories
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Give up after this many seconds and report what was scanned
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Skip entries whose name matches this glob (repeatable)
    #[arg(short, long = "ignore", value_name = "PAT")]
    ignore: Vec<String>,

    /// Skip hidden entries
    #[arg(long)]
    no_hidden: bool,

    /// Stay on the root's filesystem; mount points show up empty
    #[arg(short = 'x', long)]
    one_file_system: bool,
}

impl ScanArgs {
    fn to_config(&self, path: &Path) -> Result<ScanConfig> {
        ScanConfig::builder()
            .root(path)
            .max_concurrency(self.jobs)
            .follow_symlinks(self.follow_symlinks)
            .include_hidden(!self.no_hidden)
            .ignore_patterns(self.ignore.clone())
            .cross_filesystems(!self.one_file_system)
            .timeout(self.timeout.map(Duration::from_secs))
            .build()
            .context("Invalid scan options")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scan {
            path,
            depth,
            top,
            scan,
        } => {
            let config = scan.to_config(&path)?;
            run_scan(config, depth, top).await?;
        }
        Command::Export {
            path,
            output,
            full,
            scan,
        } => {
            let config = scan.to_config(&path)?;
            run_export(config, output, full).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "sizetree=debug" } else { "sizetree=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Run a scan in the background, reporting progress on stderr.
async fn scan_with_progress(config: ScanConfig) -> Result<FileTree> {
    let handle = ScanSession::start(config).context("Scan failed")?;
    eprintln!("Scanning {}...", handle.root_path().display());

    let progress = tokio::spawn(report_progress(handle.subscribe()));
    let tree = handle.wait().await.context("Scan failed")?;
    progress.abort();
    eprint!("\r\x1b[2K");

    if !tree.is_complete() {
        eprintln!("Scan stopped early; sizes below are partial");
    }
    Ok(tree)
}

async fn report_progress(mut rx: broadcast::Receiver<ScanProgress>) {
    loop {
        match rx.recv().await {
            Ok(progress) => eprint!(
                "\r\x1b[2K {} files, {} dirs, {} ({:.0} files/s)",
                progress.files_scanned,
                progress.dirs_scanned,
                format_size(progress.bytes_scanned),
                progress.files_per_second()
            ),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(skipped = n, "Progress reporter lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Scan and display a summary.
async fn run_scan(config: ScanConfig, max_depth: u32, top_n: usize) -> Result<()> {
    let mut tree = scan_with_progress(config).await?;
    tree.root.sort_children_by_size();

    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {} - {}",
        tree.root_path.display(),
        format_size(tree.total_size())
    );
    println!(
        " {} files, {} directories, {} symlinks",
        tree.total_files(),
        tree.total_dirs(),
        tree.stats.total_symlinks
    );
    if let Some((path, size)) = &tree.stats.largest_file {
        println!(" Largest file: {} ({})", path.display(), format_size(*size));
    }
    if let Some((path, modified)) = &tree.stats.newest_file {
        println!(
            " Newest file: {} ({})",
            path.display(),
            format_timestamp(*modified)
        );
    }
    println!(" Scanned in {:.2}s", tree.scan_duration.as_secs_f64());
    println!("{}", "─".repeat(60));
    println!();

    print_node(&tree.root, &tree.root_path, 0, max_depth, top_n, tree.root.size);

    if tree.stats.unreadable_dirs > 0 {
        println!();
        println!("{} unreadable director(ies)", tree.stats.unreadable_dirs);
    }
    if tree.has_warnings() {
        println!("{} warning(s) during scan", tree.warnings.len());
        for warning in &tree.warnings {
            debug!(path = %warning.path.display(), kind = ?warning.kind, "{}", warning.message);
        }
    }

    Ok(())
}

/// Scan and write JSON.
async fn run_export(config: ScanConfig, output: Option<PathBuf>, full: bool) -> Result<()> {
    let tree = scan_with_progress(config).await?;

    let json = if full {
        serde_json::to_string_pretty(&tree)?
    } else {
        serde_json::to_string_pretty(&tree.root)?
    };

    match output {
        Some(output_path) => {
            std::fs::write(&output_path, json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

/// Print a node and its largest children.
fn print_node(
    node: &FileNode,
    path: &Path,
    depth: u32,
    max_depth: u32,
    top_n: usize,
    root_size: u64,
) {
    let indent = "  ".repeat(depth as usize);
    let ratio = if root_size > 0 {
        node.size as f64 / root_size as f64 * 100.0
    } else {
        0.0
    };

    let bar = make_bar(ratio / 100.0, 10);

    let name = if depth == 0 {
        path.display().to_string()
    } else {
        node.name.to_string()
    };

    let marker = if node.has_error() {
        "!"
    } else if node.incomplete {
        "?"
    } else if node.is_dir() {
        "/"
    } else if node.is_symlink() {
        "@"
    } else {
        ""
    };

    println!(
        "{}{}{:<40} {:>10} {:>5.1}% {}",
        indent,
        if node.is_dir() { "▼ " } else { "  " },
        truncate(&format!("{}{}", name, marker), 40),
        format_size(node.size),
        ratio,
        bar
    );

    if node.is_dir() && depth < max_depth {
        let children = node.children();
        let remaining = children.len().saturating_sub(top_n);

        for child in children.iter().take(top_n) {
            print_node(child, &child.path, depth + 1, max_depth, top_n, root_size);
        }

        if remaining > 0 {
            let indent = "  ".repeat((depth + 1) as usize);
            println!("{}  ... and {} more", indent, remaining);
        }
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Format seconds since the epoch as a local date and time.
fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}
