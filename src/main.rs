//! CanVis - Command Line Entry Point
//!
//! Replays candump captures through the processing pipeline, searches a
//! message catalog and composes or periodically transmits frames.

use anyhow::{anyhow, bail, Context};
use canvis_rs::{
    backend::{Coordinator, CoreEvent, FilterCriteria, SearchKind, SearchRequest},
    catalog::InMemoryCatalog,
    config::{AppConfig, LogConfig},
    replay::{format_line, CandumpLog, ReplayPlayer},
    types::{Direction, SignalMap},
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "canvis", version, author, about = "CAN frame pipeline, catalog search and transmit")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a candump log through the pipeline and print passing frames
    Replay {
        /// candump log file
        log: PathBuf,
        /// Catalog JSON used for decoding
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Playback speed multiplier, 0 for as fast as possible
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Lowest identifier to show (hex)
        #[arg(long, value_parser = parse_id)]
        id_min: Option<u32>,
        /// Highest identifier to show (hex)
        #[arg(long, value_parser = parse_id)]
        id_max: Option<u32>,
        /// Only show RX or TX frames
        #[arg(long)]
        direction: Option<Direction>,
        /// Payload hex substring
        #[arg(long)]
        data: Option<String>,
        /// Message name substring
        #[arg(long)]
        message: Option<String>,
        /// Signal name substring
        #[arg(long)]
        signal: Option<String>,
    },
    /// Search a catalog and print results as JSON lines
    Search {
        term: String,
        #[arg(long)]
        catalog: PathBuf,
        /// message, signal, node, value_table or all
        #[arg(long, default_value = "all")]
        kind: SearchKind,
        #[arg(long)]
        max: Option<usize>,
        #[arg(long, default_value_t = false)]
        case_sensitive: bool,
    },
    /// Compose a frame, or transmit it periodically for a while
    Send {
        #[arg(long)]
        catalog: PathBuf,
        /// Message identifier (hex)
        #[arg(long, value_parser = parse_id)]
        id: u32,
        /// Signal value as NAME=VALUE, repeatable
        #[arg(long = "signal", value_parser = parse_signal)]
        signals: Vec<(String, f64)>,
        /// Repeat every N milliseconds instead of composing once
        #[arg(long)]
        interval_ms: Option<u64>,
        /// How long to keep a periodic transmission running
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
    },
}

fn parse_id(text: &str) -> Result<u32, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid identifier '{}': {}", text, e))
}

fn parse_signal(text: &str) -> Result<(String, f64), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", text))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid value in '{}'", text))?;
    Ok((name.trim().to_string(), value))
}

fn init_logging(log: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let (file_layer, guard) = match &log.file {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "canvis.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let compact = log
        .compact
        .then(|| fmt::layer().compact().with_writer(std::io::stderr));
    let full = (!log.compact).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(compact)
        .with(full)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn load_catalog(core: &Coordinator, path: &Path) -> anyhow::Result<()> {
    let catalog = InMemoryCatalog::load(path)
        .with_context(|| format!("loading catalog {}", path.display()))?;
    core.set_catalog(Some(Arc::new(catalog)))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::load_or_default(),
    };
    let _log_guard = init_logging(&config.log)?;

    tracing::info!("Starting canvis");
    let mut core = Coordinator::start(config.clone())?;

    let result = match cli.command {
        Command::Replay {
            log,
            catalog,
            speed,
            id_min,
            id_max,
            direction,
            data,
            message,
            signal,
        } => {
            let criteria = FilterCriteria {
                id_min,
                id_max,
                direction,
                data_pattern: data,
                message_pattern: message,
                signal_pattern: signal,
                enabled: true,
            };
            run_replay(&core, &log, catalog.as_deref(), speed, criteria)
        }
        Command::Search {
            term,
            catalog,
            kind,
            max,
            case_sensitive,
        } => {
            let request = SearchRequest::new(1, term, kind)
                .max_results(max.unwrap_or(config.search.default_max_results))
                .case_sensitive(case_sensitive);
            run_search(&core, &catalog, request)
        }
        Command::Send {
            catalog,
            id,
            signals,
            interval_ms,
            duration_ms,
        } => {
            let values: SignalMap = signals.into_iter().collect();
            run_send(&core, &catalog, id, values, interval_ms, duration_ms)
        }
    };

    if !core.shutdown() {
        tracing::warn!("Some workers did not stop in time");
    }
    result
}

fn run_replay(
    core: &Coordinator,
    log_path: &Path,
    catalog: Option<&Path>,
    speed: f64,
    criteria: FilterCriteria,
) -> anyhow::Result<()> {
    if let Some(path) = catalog {
        load_catalog(core, path)?;
    }
    core.update_filter(criteria)?;

    let log = CandumpLog::load(log_path)?;
    let mut player = ReplayPlayer::new(log);
    player.set_speed(speed);

    let ingest = core.ingest().clone();
    let replay = std::thread::Builder::new()
        .name("canvis-replay".to_string())
        .spawn(move || player.run(|frame| ingest.submit(frame)))?;

    loop {
        match core.recv_timeout(Duration::from_millis(100)) {
            Some(CoreEvent::Batch(frames)) => {
                for frame in frames {
                    match (&frame.message_name, &frame.signals) {
                        (Some(name), Some(signals)) => {
                            println!("{}  {} {:?}", format_line(&frame, "replay"), name, signals)
                        }
                        _ => println!("{}", format_line(&frame, "replay")),
                    }
                }
            }
            Some(CoreEvent::Statistics(stats)) => tracing::info!(
                "{} received, {} passed, {:.1} msg/s, decode {:.1}%",
                stats.total_received,
                stats.filtered_count,
                stats.messages_per_second,
                stats.decode_success_rate
            ),
            Some(CoreEvent::ProcessingError(message)) => tracing::warn!("{}", message),
            Some(_) => {}
            None => {
                if replay.is_finished() && core.ingest().pending_len() == 0 {
                    break;
                }
            }
        }
    }

    let summary = replay
        .join()
        .map_err(|_| anyhow!("replay thread panicked"))?;
    println!(
        "replayed {} frames ({} rejected), {} retained",
        summary.submitted,
        summary.rejected,
        core.retained_len()
    );
    Ok(())
}

fn run_search(core: &Coordinator, catalog: &Path, request: SearchRequest) -> anyhow::Result<()> {
    load_catalog(core, catalog)?;
    let request_id = request.request_id;
    core.search(request);

    loop {
        match core.recv_timeout(Duration::from_secs(10)) {
            Some(CoreEvent::SearchProgress { current, total, .. }) => {
                tracing::debug!("Searched {}/{}", current, total)
            }
            Some(CoreEvent::SearchCompleted {
                request_id: id,
                results,
            }) if id == request_id => {
                for result in &results {
                    println!("{}", serde_json::to_string(result)?);
                }
                return Ok(());
            }
            Some(CoreEvent::SearchError { message, .. }) => bail!("search failed: {}", message),
            Some(_) => {}
            None => bail!("search timed out"),
        }
    }
}

fn run_send(
    core: &Coordinator,
    catalog: &Path,
    id: u32,
    values: SignalMap,
    interval_ms: Option<u64>,
    duration_ms: u64,
) -> anyhow::Result<()> {
    load_catalog(core, catalog)?;

    let Some(interval_ms) = interval_ms else {
        core.compose(1, id, values);
        return match core.recv_timeout(Duration::from_secs(5)) {
            Some(CoreEvent::Composed { frame, .. }) => {
                let hex: String = frame.data.iter().map(|b| format!("{:02X}", b)).collect();
                println!("{:03X}#{}", frame.id, hex);
                Ok(())
            }
            Some(CoreEvent::TransmissionError { message, .. }) => bail!("compose failed: {}", message),
            other => bail!("unexpected response: {:?}", other),
        };
    };

    let periodic = core.start_periodic(id, values, interval_ms);
    let deadline = Instant::now() + Duration::from_millis(duration_ms);
    while Instant::now() < deadline {
        let wait = deadline.saturating_duration_since(Instant::now());
        match core.recv_timeout(wait) {
            Some(CoreEvent::Transmitted { frame, sent_count }) => {
                let hex: String = frame.data.iter().map(|b| format!("{:02X}", b)).collect();
                println!("#{} {:03X}#{}", sent_count, frame.id, hex);
            }
            Some(CoreEvent::TransmissionError { message, .. }) => bail!("transmit failed: {}", message),
            _ => {}
        }
    }
    core.stop_periodic(id);
    println!("sent {} frames", periodic.sent_count());
    Ok(())
}
