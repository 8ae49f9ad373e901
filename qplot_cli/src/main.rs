//! # qplot_cli
//!
//! Part of the qplot crate family.
//!
//! Loads every measurement file under a data directory with libqplot, reporting progress
//! per worker, and prints a summary of each decoded buffer.
//!
//! ## Use
//!
//! Make a template configuration with
//!
//! ```bash
//! qplot_cli -p config.yml new
//! ```
//!
//! edit it, then run
//!
//! ```bash
//! qplot_cli -p config.yml
//! ```
//!
//! Raw matrices have no axes in the file. Unless `raw_matrix_hints` is set in the
//! configuration, the axes are asked for on the terminal. Detailed diagnostics are written
//! to `qplot.log` in the working directory.
mod prompt;

use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use libqplot::config::Config;
use libqplot::discovery::FileStack;
use libqplot::hints::{AxisHintCollector, ForwardingCollector, PendingHints};
use libqplot::parse_status::{ParseEvent, ParseStatus};
use libqplot::process::{create_subsets, load_buffers, CollectorFactory};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

/// Library diagnostics go to a log file so they never tear the progress bars
fn init_file_logger() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./qplot.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

/// Each raw matrix gets its own collector; fixed hints from the config win over the terminal
fn collector_factory(
    config: &Config,
    hint_tx: mpsc::Sender<PendingHints>,
) -> Result<Box<CollectorFactory>, libqplot::error::HintError> {
    match config.fixed_hints()? {
        Some(fixed) => Ok(Box::new(move || {
            Some(Box::new(fixed.clone()) as Box<dyn AxisHintCollector>)
        })),
        None => Ok(Box::new(move || {
            Some(Box::new(ForwardingCollector::new(hint_tx.clone())) as Box<dyn AxisHintCollector>)
        })),
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("qplot_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the configuration file")
                .required(true),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    if let Err(e) = init_file_logger() {
        log::warn!("Could not create qplot.log, library diagnostics are lost: {e}");
    }

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if !config.is_n_threads_valid() {
        log::error!("n_threads must be at least 1");
        return;
    }
    log::info!("Config successfully loaded.");
    log::info!("Data Path: {}", config.data_path.to_string_lossy());
    log::info!("Recursive: {}", config.recursive);
    log::info!("Number of Workers: {}", config.n_threads);
    log::info!("Normalize Units: {}", config.normalize_units);

    let files = match FileStack::new(&config) {
        Ok(files) => files,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if files.is_empty() {
        log::warn!("No measurement files found.");
        return;
    }
    let paths = files.paths();
    log::info!(
        "Found {} files ({}).",
        files.len(),
        human_bytes::human_bytes(*files.get_total_data_size() as f64)
    );

    let (hint_tx, hint_rx) = mpsc::channel::<PendingHints>();
    let factory = match collector_factory(&config, hint_tx) {
        Ok(factory) => factory,
        Err(e) => {
            log::error!("Invalid raw_matrix_hints in config: {e}");
            return;
        }
    };

    // Setup the progress bars, one per worker that has something to do
    let style = ProgressStyle::with_template("[{bar:40}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let n_workers = create_subsets(paths.len(), config.n_threads)
        .iter()
        .filter(|s| !s.is_empty())
        .count();
    let bars: Vec<ProgressBar> = (0..n_workers)
        .map(|_| {
            let pb = pb_manager.add(ProgressBar::new(100));
            pb.set_style(style.clone());
            pb
        })
        .collect();

    // Spawn the task!
    let (tx, rx) = mpsc::channel::<ParseStatus>();
    let worker_paths = paths.clone();
    let handle = std::thread::spawn(move || load_buffers(worker_paths, config, factory, tx));

    loop {
        while let Ok(status) = rx.try_recv() {
            report(&status, &bars);
        }
        while let Ok(pending) = hint_rx.try_recv() {
            pb_manager.suspend(|| prompt::answer_on_terminal(pending));
        }
        if handle.is_finished() {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    for status in rx.try_iter() {
        report(&status, &bars);
    }
    for pb in bars.iter() {
        pb.finish();
    }

    let results = match handle.join() {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => {
            log::error!("Loading failed with error: {e}");
            return;
        }
        Err(_) => {
            log::error!("Failed to join loading task!");
            return;
        }
    };

    let mut n_failed = 0;
    for (index, result) in results {
        match result {
            Ok(buffer) => log::info!("{}", buffer.summary()),
            Err(e) => {
                n_failed += 1;
                log::error!("{}: {e}", paths[index].display());
            }
        }
    }
    if n_failed > 0 {
        log::warn!("{n_failed} files failed to load; see qplot.log for details.");
    }

    log::info!("Done.");
}

fn report(status: &ParseStatus, bars: &[ProgressBar]) {
    let Some(pb) = bars.get(status.worker_id) else {
        return;
    };
    match &status.event {
        ParseEvent::Progress(fraction) => {
            pb.set_message(status.name.clone());
            pb.set_position((fraction * 100.0) as u64);
        }
        ParseEvent::Ready => pb.set_position(100),
        ParseEvent::Notice(message) => log::warn!("{}: {message}", status.name),
        ParseEvent::Failed(message) => log::error!("{}: {message}", status.name),
    }
}
