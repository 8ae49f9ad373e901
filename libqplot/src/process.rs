use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

use super::buffer::Buffer;
use super::config::Config;
use super::error::{BufferError, ProcessorError};
use super::hints::AxisHintCollector;
use super::parse_status::{ParseEvent, ParseStatus, StatusSink};

/// Builds a fresh axis hint collector for each buffer that may need one
pub type CollectorFactory = dyn Fn() -> Option<Box<dyn AxisHintCollector>> + Send + Sync;

/// The outcome of one file, tagged with its index in the discovered file list
pub type BufferResult = (usize, Result<Buffer, BufferError>);

/// Open and fully parse one file.
pub fn load_buffer(
    path: &Path,
    config: &Config,
    collector: Option<Box<dyn AxisHintCollector>>,
    sink: StatusSink,
) -> Result<Buffer, BufferError> {
    let mut buffer = Buffer::open(path, &config.open_options())?.with_status_sink(sink);
    if let Some(collector) = collector {
        buffer = buffer.with_hint_collector(collector);
    }
    buffer.prepare_data()?;
    if config.export_matrices {
        for index in 0..buffer.get_number_of_measured_parameters() {
            if buffer.get_number_of_dimensions() == 3 {
                buffer.create_matrix_file(index)?;
            }
        }
    }
    Ok(buffer)
}

/// Parse a subset of the files. A failing file is reported and the next one is started.
pub fn process_subset(
    paths: &[PathBuf],
    subset: Vec<usize>,
    config: &Config,
    collector_factory: &CollectorFactory,
    tx: Sender<ParseStatus>,
    worker_id: usize,
) -> Vec<BufferResult> {
    let mut results = Vec::with_capacity(subset.len());
    for index in subset {
        let path = &paths[index];
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let sink = StatusSink::new(tx.clone(), worker_id, index, &name);
        spdlog::info!("Worker {} processing {}...", worker_id, path.display());
        let result = load_buffer(path, config, collector_factory(), sink.clone());
        match &result {
            Ok(_) => spdlog::info!("Finished processing {}.", name),
            Err(e) => {
                spdlog::error!("Failed to process {}: {}", name, e);
                sink.send(ParseEvent::Failed(e.to_string()));
            }
        }
        results.push((index, result));
    }
    results
}

/// Divide `n_files` file indices into `n_threads` round-robin subsets
pub fn create_subsets(n_files: usize, n_threads: usize) -> Vec<Vec<usize>> {
    let mut subsets: Vec<Vec<usize>> = vec![Vec::new(); n_threads.max(1)];
    let n_subsets = subsets.len();

    for idx in 0..n_files {
        subsets[idx % n_subsets].push(idx)
    }

    subsets
}

/// Spawn one worker per non-empty subset and parse every file.
///
/// Returns one result per path, in path order.
pub fn load_buffers(
    paths: Vec<PathBuf>,
    config: Config,
    collector_factory: Box<CollectorFactory>,
    tx: Sender<ParseStatus>,
) -> Result<Vec<BufferResult>, ProcessorError> {
    let paths = std::sync::Arc::new(paths);
    let config = std::sync::Arc::new(config);
    let collector_factory: std::sync::Arc<CollectorFactory> = collector_factory.into();

    let mut handles: Vec<JoinHandle<Vec<BufferResult>>> = vec![];
    for (worker_id, subset) in create_subsets(paths.len(), config.n_threads)
        .into_iter()
        .enumerate()
    {
        if subset.is_empty() {
            continue;
        }
        let paths = paths.clone();
        let config = config.clone();
        let factory = collector_factory.clone();
        let tx = tx.clone();
        handles.push(std::thread::spawn(move || {
            process_subset(&paths, subset, &config, factory.as_ref(), tx, worker_id)
        }));
    }
    drop(tx);

    let mut results = Vec::with_capacity(paths.len());
    for handle in handles {
        match handle.join() {
            Ok(mut subset_results) => results.append(&mut subset_results),
            Err(_) => return Err(ProcessorError::WorkerPanic),
        }
    }
    results.sort_by_key(|(index, _)| *index);
    Ok(results)
}
