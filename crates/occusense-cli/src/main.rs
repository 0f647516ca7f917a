//! `occusense` – occupancy estimation from camera frames.
//!
//! Subcommands:
//!
//! - `run <dir>` replays the image files of a directory through one stream
//!   worker, prints every reading as a JSON line and records it in the
//!   reading log.
//! - `stats` summarises the readings recorded over the last N minutes.
//! - `latest` prints the most recent successful reading of a stream, or
//!   writes its most recent stored frame to a file.
//! - `init` writes a default `~/.occusense/config.toml`.

mod config;
mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use occusense_hal::remote::HttpRegionDetector;
use occusense_hal::source::DirectorySource;
use occusense_memory::ReadingStore;
use occusense_perception::OccupancyEngine;
use occusense_runtime::{ReadingBus, WorkerSummary};

use crate::replay::{ReplayOptions, replay};

#[derive(Parser, Debug)]
#[command(name = "occusense")]
#[command(version, about = "Multi-signal occupancy estimation", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.occusense/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process the image files of a directory as one stream
    Run {
        /// Directory holding the frames, processed in file-name order
        dir: PathBuf,

        /// Stream identifier attached to each reading
        #[arg(short, long)]
        stream: Option<String>,

        /// Reading log path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Do not record readings
        #[arg(long)]
        no_record: bool,

        /// Keep each frame next to its reading
        #[arg(long)]
        store_frames: bool,
    },

    /// Summarise recorded readings
    Stats {
        /// Reading log path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Size of the window, ending now
        #[arg(short, long, default_value_t = 60)]
        minutes: i64,
    },

    /// Show the most recent successful reading of a stream
    Latest {
        /// Stream identifier
        #[arg(short, long)]
        stream: Option<String>,

        /// Reading log path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Write the stream's most recent stored frame to this file
        #[arg(long, value_name = "OUT")]
        frame: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the readings.
    let _guard = occusense_runtime::init_tracing("occusense");

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);

    match cli.command {
        Command::Init { force } => init(&config_path, force),
        Command::Run {
            dir,
            stream,
            db,
            no_record,
            store_frames,
        } => {
            let mut cfg = config::load_or_default(&config_path).map_err(|e| anyhow!(e))?;
            if let Some(stream) = stream {
                cfg.stream_id = stream;
            }
            cfg.store_frames |= store_frames;
            let db = (!no_record).then(|| db.unwrap_or_else(|| cfg.database_path()));
            run(&cfg, &dir, db.as_deref())
        }
        Command::Stats { db, minutes } => {
            let cfg = config::load_or_default(&config_path).map_err(|e| anyhow!(e))?;
            stats(&db.unwrap_or_else(|| cfg.database_path()), minutes)
        }
        Command::Latest { stream, db, frame } => {
            let cfg = config::load_or_default(&config_path).map_err(|e| anyhow!(e))?;
            let stream = stream.unwrap_or_else(|| cfg.stream_id.clone());
            let db = db.unwrap_or_else(|| cfg.database_path());
            match frame {
                Some(out) => latest_frame(&db, &stream, &out),
                None => latest(&db, &stream),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// init
// ─────────────────────────────────────────────────────────────────────────────

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!(
            "  Config already present at {} (use {} to overwrite)",
            path.display().to_string().bold(),
            "--force".bold()
        );
        return Ok(());
    }
    config::save_to(&config::Config::default(), path).map_err(|e| anyhow!(e))?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn run(cfg: &config::Config, dir: &Path, db: Option<&Path>) -> Result<()> {
    let mut source = DirectorySource::open(&cfg.stream_id, dir)?;
    let store = match db {
        Some(path) => Some(open_store(path)?),
        None => None,
    };

    // The detectors hold blocking HTTP clients, which must be built outside
    // the async runtime.
    let timeout = Duration::from_millis(cfg.detector_timeout_ms);
    let person = HttpRegionDetector::new("person", &cfg.person_detector_url, timeout)?;
    let face = HttpRegionDetector::new("face", &cfg.face_detector_url, timeout)?;
    let (person_url, face_url) = (person.url().to_string(), face.url().to_string());
    let engine = OccupancyEngine::new(cfg.engine.clone(), person, face)?;

    info!(
        stream = %cfg.stream_id,
        frames = source.remaining(),
        dir = %dir.display(),
        person = %person_url,
        face = %face_url,
        "replaying frames"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let options = ReplayOptions {
        stream_id: cfg.stream_id.clone(),
        queue_depth: cfg.queue_depth,
        store_frames: cfg.store_frames,
    };
    let outcome = runtime.block_on(async {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{}",
                    "⚠  Ctrl-C received – finishing current frame …".yellow().bold()
                );
                flag.store(true, Ordering::SeqCst);
            }
        });

        replay(
            &mut source,
            engine,
            ReadingBus::default(),
            store,
            &options,
            &shutdown,
            |label, event| {
                let line = serde_json::json!({
                    "frame": label,
                    "stream": event.stream_id,
                    "reading": event.reading,
                });
                println!("{line}");
            },
        )
        .await
    })?;

    print_run_summary(&cfg.stream_id, outcome.summary, outcome.recorded, db);
    Ok(())
}

fn print_run_summary(
    stream: &str,
    summary: WorkerSummary,
    recorded: Option<u64>,
    db: Option<&Path>,
) {
    eprintln!();
    eprintln!("  {} {}", "Stream".bold(), stream.cyan());
    eprintln!("    frames processed : {}", summary.frames);
    let degraded = summary.degraded.to_string();
    eprintln!(
        "    degraded readings: {}",
        if summary.degraded == 0 { degraded.green() } else { degraded.yellow() }
    );
    match (recorded, db) {
        (Some(n), Some(path)) => {
            eprintln!("    recorded         : {} → {}", n, path.display().to_string().dimmed())
        }
        _ => eprintln!("    recorded         : {}", "off".dimmed()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// stats / latest
// ─────────────────────────────────────────────────────────────────────────────

fn open_store(path: &Path) -> Result<ReadingStore> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("database path is not valid UTF-8: {}", path.display()))?;
    ReadingStore::open(path_str).with_context(|| format!("failed to open {}", path.display()))
}

fn stats(db: &Path, minutes: i64) -> Result<()> {
    if minutes <= 0 {
        return Err(anyhow!("--minutes must be positive (got {minutes})"));
    }
    let store = open_store(db)?;
    let since = chrono::Utc::now() - chrono::Duration::minutes(minutes);
    let stats = store.stats_since(since)?;

    println!();
    println!("  {} (last {} min)", "Occupancy statistics".bold().cyan(), minutes);
    println!("    readings          : {}", stats.total_readings);
    println!("    error readings    : {}", stats.error_readings);
    println!("    average occupancy : {:.2}", stats.average_occupancy);
    println!("    peak occupancy    : {}", stats.max_occupancy);
    println!("    average confidence: {:.2}", stats.average_confidence);
    println!();
    Ok(())
}

fn latest(db: &Path, stream: &str) -> Result<()> {
    let store = open_store(db)?;
    match store.latest(stream)? {
        Some(event) => println!("{}", serde_json::to_string(&event)?),
        None => println!(
            "  {} for stream {}",
            "No readings recorded".yellow(),
            stream.bold()
        ),
    }
    Ok(())
}

fn latest_frame(db: &Path, stream: &str, out: &Path) -> Result<()> {
    let store = open_store(db)?;
    let Some(frame) = store.latest_frame(stream)? else {
        println!(
            "  {} for stream {} (run with {})",
            "No frames stored".yellow(),
            stream.bold(),
            "--store-frames".bold()
        );
        return Ok(());
    };
    std::fs::write(out, &frame.bytes)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "  {} Frame of {} ({} bytes) saved to {}",
        "✓".green().bold(),
        frame.timestamp.to_rfc3339(),
        frame.bytes.len(),
        out.display().to_string().bold()
    );
    Ok(())
}
