use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use uelog_filter::FilterEngine;
use uelog_monitor::FileMonitor;
use uelog_parser::LogParser;
use uelog_types::{EntryKind, LogEntry};

mod config;

use config::ViewerConfig;

/// uelog - a terminal viewer for Unreal Engine log files
#[derive(Parser, Debug)]
#[command(name = "uelog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log file to view
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Filter definitions (JSON) to apply
    #[arg(long, value_name = "PATH")]
    filters: Option<PathBuf>,

    /// Keep watching the file and print new matching entries as they arrive
    #[arg(long)]
    follow: bool,

    /// Poll interval for --follow, in milliseconds
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing for debugging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let config = ViewerConfig::load();

    let mut engine = FilterEngine::new();
    if let Some(path) = args.filters.as_ref().or(config.filters_path.as_ref()) {
        engine.load_filters(path)?;
    }

    let mut parser = LogParser::new();
    parser.load_file(&args.file)?;
    let entries = parser.parse_entries(0);

    for entry in engine.apply_filters(&entries) {
        println!("{}", entry.raw_text);
    }

    if args.follow {
        follow(&args, &config, &parser, engine).await?;
    }

    Ok(())
}

/// Groups tailed lines back into logical entries.
///
/// Tailed lines arrive pre-split and already finalized entries cannot be
/// amended, so the last parsed entry is held back until a line arrives that
/// starts a new one; continuation lines are merged into the held entry in
/// the meantime.
struct TailAssembler {
    pending: Option<LogEntry>,
    next_line: u64,
}

impl TailAssembler {
    fn new(next_line: u64) -> Self {
        Self {
            pending: None,
            next_line,
        }
    }

    /// Feed one tailed physical line. Returns the entry this line completed,
    /// if any; the line itself may open a new pending entry or extend the
    /// held one.
    fn push_line(&mut self, line: &str) -> Option<LogEntry> {
        let line_number = self.next_line;
        self.next_line += 1;

        if line.trim().is_empty() {
            return None;
        }

        let merge = match &self.pending {
            Some(entry) => {
                !LogParser::is_entry_header(line) && entry.kind != EntryKind::Unstructured
            }
            None => false,
        };
        if merge {
            if let Some(entry) = self.pending.as_mut() {
                entry.append_continuation(line);
            }
            return None;
        }

        self.pending
            .replace(LogParser::parse_single_entry(line, line_number))
    }

    /// Hand out the held entry; no further lines can extend it.
    fn finish(&mut self) -> Option<LogEntry> {
        self.pending.take()
    }
}

/// Tail the file and print entries passing the filters until Ctrl-C.
async fn follow(
    args: &Args,
    config: &ViewerConfig,
    parser: &LogParser,
    mut engine: FilterEngine,
) -> Result<()> {
    let poll_ms = args
        .poll_interval_ms
        .or(config.poll_interval_ms)
        .unwrap_or(100);

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<Vec<String>>();
    let mut monitor = FileMonitor::new();
    monitor.set_poll_interval(Duration::from_millis(poll_ms));
    monitor.set_callback(move |_path, lines| {
        let _ = line_tx.send(lines.to_vec());
    });
    monitor.start_monitoring(&args.file).await?;

    let mut assembler = TailAssembler::new(parser.total_line_count());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            received = line_rx.recv() => {
                let Some(lines) = received else { break };
                for line in lines {
                    if let Some(entry) = assembler.push_line(&line) {
                        if engine.passes_filters(&entry) {
                            println!("{}", entry.raw_text);
                        }
                    }
                }
            }
        }
    }

    if let Some(entry) = assembler.finish() {
        if engine.passes_filters(&entry) {
            println!("{}", entry.raw_text);
        }
    }

    monitor.stop_monitoring().await?;
    Ok(())
}
