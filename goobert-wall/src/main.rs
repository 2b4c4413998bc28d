//! Goobert video wall - main entry point
//!
//! Runs the wall headless with the simulated engine and drives it from
//! stdin: every line is a key name (`space`, `shift+n`, `ctrl+r`), an
//! action name (`next_selected`) or one of the driver commands listed by
//! `help`.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use goobert_common::db::{init_database, StatsDb};
use goobert_common::time::format_watch_ms;
use goobert_common::{CellId, EventBus, WallConfig, WallEvent};
use goobert_wall::accounting::{spawn_writer, SinkHandle, WriterStats};
use goobert_wall::engine::SimulatedEngineFactory;
use goobert_wall::{
    spawn_wall, ActionResolver, CellCommand, GridRequest, KeyMap, Wall, WallCommand, WallHandle,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Playback clock tick of the simulated engines
const SIMULATED_TICK: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "goobert")]
#[command(about = "Video wall of independently playing media cells")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GOOBERT_GIT_HASH"), ", built ", env!("GOOBERT_BUILD_TIMESTAMP"), ")"))]
struct Cli {
    /// Config file (overrides GOOBERT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the wall and read key names from stdin
    Run {
        /// Directory or file to play (defaults to paths.default_media_path)
        source: Option<PathBuf>,
        #[arg(long)]
        rows: Option<usize>,
        #[arg(long)]
        cols: Option<usize>,
        /// Space-separated name filter
        #[arg(long, default_value = "")]
        filter: String,
        /// Print every wall event as one JSON line
        #[arg(long)]
        json_events: bool,
    },
    /// Print the most watched files
    Stats {
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// Print the key bindings
    Keys,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = WallConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command.unwrap_or(Commands::Run {
        source: None,
        rows: None,
        cols: None,
        filter: String::new(),
        json_events: false,
    }) {
        Commands::Run {
            source,
            rows,
            cols,
            filter,
            json_events,
        } => {
            let request = GridRequest {
                rows: rows.unwrap_or(config.grid.default_rows),
                cols: cols.unwrap_or(config.grid.default_cols),
                source: source.unwrap_or_else(|| config.default_media_path()),
                filter,
            };
            run(config, request, json_events).await
        }
        Commands::Stats { limit } => print_stats(&config.database_path(), limit).await,
        Commands::Keys => {
            println!("{}", KeyMap::new().generate_help_text());
            Ok(())
        }
    }
}

async fn run(config: WallConfig, request: GridRequest, json_events: bool) -> Result<()> {
    info!("Starting Goobert {}x{} wall on {}", request.rows, request.cols, request.source.display());

    let (sink, writer) = if config.stats.enabled {
        let db_path = config.database_path();
        let pool = init_database(&db_path)
            .await
            .with_context(|| format!("Failed to open stats database {}", db_path.display()))?;
        info!("Stats database: {}", db_path.display());
        let (sink, rx) = SinkHandle::channel();
        (sink, Some(spawn_writer(StatsDb::new(pool), rx)))
    } else {
        (SinkHandle::disabled(), None)
    };

    let events = EventBus::new(1024);
    let printer = spawn_printer(&events, json_events);

    let factory = SimulatedEngineFactory::new().with_clock(SIMULATED_TICK);
    let wall = Wall::new(&config, Box::new(factory), sink, events);
    let (handle, wall_task) = spawn_wall(wall);
    handle.start_grid(request)?;

    let keymap = KeyMap::new();
    let mut lines = spawn_line_reader(BufReader::new(std::io::stdin()));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            line = lines.recv() => match line.transpose().context("Failed to read stdin")? {
                Some(line) => {
                    if !drive(&handle, &keymap, line.trim())? {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut shutdown => break,
        }
    }

    let report = handle.shutdown().await?;
    drop(handle);
    wall_task.await.context("Wall loop panicked")?;
    info!(
        "Wall stopped: {} sessions flushed, {} watchdog restarts",
        report.sessions_flushed, report.restarts_total
    );

    if let Some(writer) = writer {
        let WriterStats { applied, failed } = writer.await.context("Stats writer panicked")?;
        info!(applied, failed, "Stats written");
    }
    // The bus closes with the wall, ending the printer
    let _ = printer.await;
    Ok(())
}

/// Read lines on a dedicated thread
///
/// A blocked read never holds up runtime shutdown; the thread ends with
/// the process. The channel closes at end of input or after a read error.
fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Handle one stdin line; false ends the session
fn drive(handle: &WallHandle, keymap: &KeyMap, line: &str) -> Result<bool> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => {}
        ["quit"] | ["exit"] => return Ok(false),
        ["help"] => {
            println!("{}", keymap.generate_help_text());
            println!();
            println!("Commands: select R C, play R C PATH, index R C N, source R C PATH..., volume N, rename OLD NEW, stop, quit");
        }
        ["stop"] => handle.stop_grid()?,
        ["volume", volume] => match volume.parse::<u8>() {
            Ok(volume) => handle.send(WallCommand::SetVolume(volume))?,
            Err(_) => println!("Volume must be 0-100"),
        },
        ["rename", old_path, new_path] => handle.send(WallCommand::Rename {
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
        })?,
        ["select", row, col] => cell_command(handle, row, col, CellCommand::Select)?,
        ["play", row, col, path] => {
            cell_command(handle, row, col, CellCommand::PlayFile(path.to_string()))?
        }
        ["index", row, col, index] => match index.parse::<usize>() {
            Ok(index) => cell_command(handle, row, col, CellCommand::PlayIndex(index))?,
            Err(_) => println!("Index must be a number"),
        },
        ["source", row, col, paths @ ..] if !paths.is_empty() => match parse_cell(row, col) {
            Some(cell) => handle.send(WallCommand::CellSource {
                cell,
                paths: paths.iter().map(PathBuf::from).collect(),
                filter: String::new(),
            })?,
            None => println!("Row and column must be numbers"),
        },
        _ => match keymap.resolve(line) {
            Some(action) => handle.action(action)?,
            None => println!("Unknown key or command: {} (try `help`)", line),
        },
    }
    Ok(true)
}

fn parse_cell(row: &str, col: &str) -> Option<CellId> {
    Some(CellId::new(row.parse().ok()?, col.parse().ok()?))
}

fn cell_command(handle: &WallHandle, row: &str, col: &str, command: CellCommand) -> Result<()> {
    match parse_cell(row, col) {
        Some(cell) => handle.send(WallCommand::Cell { cell, command })?,
        None => println!("Row and column must be numbers"),
    }
    Ok(())
}

fn spawn_printer(events: &EventBus, json: bool) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event, json),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &WallEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Event not serializable: {}", e),
        }
        return;
    }
    match event {
        WallEvent::CellProgress { .. } => {}
        WallEvent::GridStarted { rows, cols, file_count, .. } => {
            println!("Grid {}x{} started with {} files", rows, cols, file_count)
        }
        WallEvent::GridStopped { sessions_flushed, .. } => {
            println!("Grid stopped ({} sessions flushed)", sessions_flushed)
        }
        WallEvent::CellFileChanged { cell, file: Some(file), .. } => {
            let name = Path::new(file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.clone());
            println!("{} {}", cell, name)
        }
        WallEvent::CellFileChanged { cell, file: None, .. } => println!("{} idle", cell),
        WallEvent::CellLoopChanged { cell, looping } => {
            println!("{} loop {}", cell, if *looping { "on" } else { "off" })
        }
        WallEvent::SelectionChanged { selected, .. } => println!("Selected {}", selected),
        WallEvent::FullscreenChanged { mode, .. } => println!("Fullscreen: {}", mode),
        WallEvent::VolumeChanged { volume } => println!("Volume {}", volume),
        WallEvent::WatchdogRestart { cell, playlist_len, .. } => {
            println!("Watchdog restarted {} ({} files)", cell, playlist_len)
        }
        WallEvent::Notice { message, .. } => println!("{}", message),
    }
}

async fn print_stats(db_path: &Path, limit: i64) -> Result<()> {
    let pool = init_database(db_path)
        .await
        .with_context(|| format!("Failed to open stats database {}", db_path.display()))?;
    let db = StatsDb::new(pool);

    let total = db.total_watch_ms().await.context("Failed to read totals")?;
    let files = db.total_files_tracked().await.context("Failed to read totals")?;
    println!("{} files, {} watched", files, format_watch_ms(total));
    println!();

    for (rank, stats) in db
        .most_watched(limit)
        .await
        .context("Failed to read most watched files")?
        .iter()
        .enumerate()
    {
        println!(
            "{:>3}. {:>9}  {:>4} plays  {}",
            rank + 1,
            format_watch_ms(stats.total_watch_ms),
            stats.play_count,
            stats.file_path
        );
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
