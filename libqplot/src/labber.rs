//! Instrument logs (Labber `.hdf5` files) and the reconstruction of their matrices.
//!
//! A log records each channel as a 2-D array with one row per log entry (one pass of the
//! inner sweep) and one column per point. Outer sweeps recorded back-and-forth are
//! detected from the recorded set-point channels and undone during assembly.
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::axis::{AxisMeta, AxisValues};
use super::buffer::{BufferData, Dimensions};
use super::error::{BufferError, LogError};
use super::parse_status::{ProgressTracker, StatusSink};

/// A swept (step) channel and the distinct values it was set to
#[derive(Debug, Clone, PartialEq)]
pub struct StepChannel {
    pub name: String,
    pub unit: String,
    pub values: Vec<f64>,
}

/// A measured (log) channel
#[derive(Debug, Clone, PartialEq)]
pub struct LogChannel {
    pub name: String,
    pub unit: String,
}

/// Read access to an instrument log.
pub trait InstrumentLog {
    fn step_channels(&self) -> Vec<StepChannel>;
    fn log_channels(&self) -> Vec<LogChannel>;
    /// Recorded values of `channel`, one row per log entry
    fn data(&self, channel: &str) -> Result<Array2<f64>, LogError>;
    fn number_of_logs(&self) -> usize;
}

/// An instrument log held entirely in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryLog {
    steps: Vec<StepChannel>,
    logs: Vec<LogChannel>,
    data: BTreeMap<String, Array2<f64>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(
        mut self,
        name: &str,
        unit: &str,
        values: Vec<f64>,
        recorded: Array2<f64>,
    ) -> Self {
        self.steps.push(StepChannel {
            name: name.to_string(),
            unit: unit.to_string(),
            values,
        });
        self.data.insert(name.to_string(), recorded);
        self
    }

    pub fn with_log(mut self, name: &str, unit: &str, recorded: Array2<f64>) -> Self {
        self.logs.push(LogChannel {
            name: name.to_string(),
            unit: unit.to_string(),
        });
        self.data.insert(name.to_string(), recorded);
        self
    }
}

impl InstrumentLog for MemoryLog {
    fn step_channels(&self) -> Vec<StepChannel> {
        self.steps.clone()
    }

    fn log_channels(&self) -> Vec<LogChannel> {
        self.logs.clone()
    }

    fn data(&self, channel: &str) -> Result<Array2<f64>, LogError> {
        self.data
            .get(channel)
            .cloned()
            .ok_or_else(|| LogError::UnknownChannel(channel.to_string()))
    }

    fn number_of_logs(&self) -> usize {
        self.data.values().map(|d| d.nrows()).max().unwrap_or(0)
    }
}

/// Open the log at `path` with the HDF5 reader.
#[cfg(feature = "labber")]
pub fn open_log(path: &Path) -> Result<Box<dyn InstrumentLog + Send>, LogError> {
    Ok(Box::new(super::labber_hdf::read_log(path)?))
}

/// Open the log at `path`. This build carries no HDF5 reader.
#[cfg(not(feature = "labber"))]
pub fn open_log(_path: &Path) -> Result<Box<dyn InstrumentLog + Send>, LogError> {
    Err(LogError::OptionalBackendUnavailable)
}

/// True when row 1 of the recorded set-point channel is row 0 reversed, and row 0 is
/// not constant.
pub fn is_alternating(recorded: &Array2<f64>) -> bool {
    if recorded.nrows() < 2 || recorded.ncols() < 2 {
        return false;
    }
    let first = recorded.row(0);
    let second = recorded.row(1);
    let constant = first.iter().all(|v| *v == first[0]);
    !constant && first.iter().rev().zip(second.iter()).all(|(a, b)| a == b)
}

/// Position in the recorded array holding cell `(i, j)` of the `k`-th measured matrix.
///
/// Negative positions count from the end of the recorded extent, so a truncated capture
/// may yield a position that does not exist.
pub fn source_index(
    i: usize,
    j: usize,
    k: usize,
    x_alt: bool,
    y_alt: bool,
    extent: (usize, usize),
) -> Option<(usize, usize)> {
    let (rows, cols) = extent;
    let from_end = |idx: usize, len: usize| len.checked_sub(idx + 1);
    let odd = |n: usize| n % 2 == 1;
    let (row, col) = match (x_alt, y_alt) {
        (true, true) if odd(k) && odd(j) => (from_end(j, rows)?, from_end(i, cols)?),
        (true, false) if odd(j) => (j, from_end(i, cols)?),
        (false, true) if odd(k) => (from_end(j, rows)?, i),
        _ => (j, i),
    };
    (row < rows && col < cols).then_some((row, col))
}

/// A Labber instrument log behind a Buffer.
pub struct LabberFile {
    path: PathBuf,
    log: Option<Box<dyn InstrumentLog + Send>>,
    sweeps: Vec<StepChannel>,
    measured: Vec<LogChannel>,
}

impl std::fmt::Debug for LabberFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabberFile")
            .field("path", &self.path)
            .field("sweeps", &self.sweeps)
            .field("measured", &self.measured)
            .finish()
    }
}

impl LabberFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            log: None,
            sweeps: vec![],
            measured: vec![],
        }
    }

    /// Wrap an already opened log
    pub fn from_log(path: &Path, log: Box<dyn InstrumentLog + Send>) -> Self {
        Self {
            path: path.to_path_buf(),
            log: Some(log),
            sweeps: vec![],
            measured: vec![],
        }
    }

    fn log(&mut self) -> Result<&dyn InstrumentLog, LogError> {
        if self.log.is_none() {
            self.log = Some(open_log(&self.path)?);
        }
        match &self.log {
            Some(log) => Ok(log.as_ref()),
            None => Err(LogError::OptionalBackendUnavailable),
        }
    }

    pub fn compute_dimensions(&mut self, sink: &StatusSink) -> Result<Dimensions, BufferError> {
        let path = self.path.clone();
        let log = self.log()?;
        let mut sweeps: Vec<StepChannel> = log
            .step_channels()
            .into_iter()
            .filter(|c| c.values.len() > 1)
            .collect();
        let measured = log.log_channels();
        spdlog::debug!(
            "{} holds {} log entries, {} swept and {} measured channels",
            path.display(),
            log.number_of_logs(),
            sweeps.len(),
            measured.len()
        );

        if sweeps.is_empty() {
            return Err(LogError::NoSweepAxes.into());
        }
        if sweeps.len() > 2 {
            sink.notice(format!(
                "{} channels are swept; only {} and {} are used",
                sweeps.len(),
                sweeps[0].name,
                sweeps[1].name
            ));
            sweeps.truncate(2);
        }

        let metas: Vec<AxisMeta> = measured
            .iter()
            .map(|c| AxisMeta::new(&c.name, &c.unit))
            .collect();
        let x_meta = AxisMeta::new(&sweeps[0].name, &sweeps[0].unit);
        let dims = match sweeps.get(1) {
            Some(y) => Dimensions {
                matrix_dimensions: vec![sweeps[0].values.len(), y.values.len()],
                number_of_set_parameters: 2,
                number_of_measured_parameters: measured.len(),
                axis_values: AxisValues::three_dimensional(
                    x_meta,
                    AxisMeta::new(&y.name, &y.unit),
                    metas,
                ),
            },
            None => Dimensions {
                matrix_dimensions: vec![sweeps[0].values.len()],
                number_of_set_parameters: 1,
                number_of_measured_parameters: measured.len(),
                axis_values: AxisValues::two_dimensional(x_meta, metas),
            },
        };
        self.sweeps = sweeps;
        self.measured = measured;
        Ok(dims)
    }

    pub fn prepare_data(
        &mut self,
        dims: &Dimensions,
        sink: &StatusSink,
    ) -> Result<BufferData, BufferError> {
        let sweeps = self.sweeps.clone();
        let measured = self.measured.clone();
        let (Some(x_channel), Some(&n_x)) = (sweeps.first(), dims.matrix_dimensions.first())
        else {
            return Err(BufferError::NotReady);
        };
        let log = self.log()?;
        let mut tracker = ProgressTracker::new(sink, measured.len() * n_x);
        let x = x_channel.values.clone();

        let data = match (sweeps.get(1), dims.matrix_dimensions.get(1)) {
            (Some(y_channel), Some(&n_y)) => {
                let x_alt = is_alternating(&log.data(&x_channel.name)?);
                let y_alt = is_alternating(&log.data(&y_channel.name)?);
                spdlog::debug!("Alternating sweeps: x {x_alt}, y {y_alt}");

                let mut matrix = Vec::with_capacity(measured.len());
                let mut short = false;
                for (k, channel) in measured.iter().enumerate() {
                    let recorded = log.data(&channel.name)?;
                    let extent = recorded.dim();
                    short |= extent.0 < n_y;
                    let mut m = Array2::<f64>::zeros((n_x, n_y));
                    for i in 0..n_x {
                        for j in 0..n_y {
                            if let Some(idx) = source_index(i, j, k, x_alt, y_alt, extent) {
                                m[[i, j]] = recorded[idx];
                            }
                        }
                        tracker.update(k * n_x + i + 1);
                    }
                    matrix.push(m);
                }
                if short {
                    sink.notice(format!(
                        "Log stopped early; fewer than {n_y} entries were recorded, missing cells are zero"
                    ));
                }
                BufferData {
                    x,
                    y: y_channel.values.clone(),
                    traces: vec![],
                    matrix,
                }
            }
            _ => {
                let mut traces = Vec::with_capacity(measured.len());
                for (k, channel) in measured.iter().enumerate() {
                    let mut trace: Vec<f64> = log.data(&channel.name)?.iter().copied().collect();
                    trace.resize(n_x, 0.0);
                    traces.push(trace);
                    tracker.update((k + 1) * n_x);
                }
                BufferData {
                    x,
                    y: traces.first().cloned().unwrap_or_default(),
                    traces,
                    matrix: vec![],
                }
            }
        };
        tracker.finish();
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, ShapeBuilder};

    /// A log of `f(x, y)` over `xs` (inner) and `ys` (outer), recorded with the inner
    /// sweep reversed on every odd entry when `x_alt` is set.
    fn synthetic_log(
        xs: &[f64],
        ys: &[f64],
        x_alt: bool,
        f: impl Fn(usize, usize) -> f64,
    ) -> MemoryLog {
        let order = |j: usize| -> Vec<usize> {
            if x_alt && j % 2 == 1 {
                (0..xs.len()).rev().collect()
            } else {
                (0..xs.len()).collect()
            }
        };
        let shape = (ys.len(), xs.len());
        let x_rec = Array2::from_shape_fn(shape, |(j, c)| xs[order(j)[c]]);
        let y_rec = Array2::from_shape_fn(shape, |(j, _)| ys[j]);
        let z_rec = Array2::from_shape_fn(shape, |(j, c)| f(order(j)[c], j));
        MemoryLog::new()
            .with_step("gate", "V", xs.to_vec(), x_rec)
            .with_step("bias", "mV", ys.to_vec(), y_rec)
            .with_step("field", "T", vec![0.5], Array2::from_elem(shape, 0.5))
            .with_log("current", "nA", z_rec)
    }

    #[test]
    fn test_is_alternating() {
        assert!(is_alternating(&array![[0.0, 1.0, 2.0], [2.0, 1.0, 0.0]]));
        assert!(!is_alternating(&array![[0.0, 1.0, 2.0], [0.0, 1.0, 2.0]]));
        assert!(!is_alternating(&array![[1.0, 1.0], [1.0, 1.0]]));
        assert!(!is_alternating(&array![[0.0, 1.0, 2.0]]));
    }

    #[test]
    fn test_source_index_bounds() {
        assert_eq!(source_index(0, 1, 0, true, false, (2, 3)), Some((1, 2)));
        assert_eq!(source_index(2, 1, 0, false, false, (2, 3)), Some((1, 2)));
        assert_eq!(source_index(0, 2, 0, false, false, (2, 3)), None);
        assert_eq!(source_index(0, 3, 1, false, true, (2, 3)), None);
        assert_eq!(source_index(1, 1, 1, true, true, (2, 3)), Some((0, 1)));
    }

    #[test]
    fn test_x_alternating_assembly() {
        let log = synthetic_log(&[0.0, 1.0, 2.0], &[0.0, 1.0], true, |i, j| {
            (10 * i + j) as f64
        });
        assert_eq!(
            log.data("gate").unwrap(),
            array![[0.0, 1.0, 2.0], [2.0, 1.0, 0.0]]
        );
        let sink = StatusSink::detached();
        let mut file = LabberFile::from_log(Path::new("scan.hdf5"), Box::new(log));
        let dims = file.compute_dimensions(&sink).unwrap();
        assert_eq!(dims.matrix_dimensions, vec![3, 2]);
        assert_eq!(dims.axis_values.x.name, "gate");
        assert_eq!(dims.axis_values.y[&0].unit, "mV");

        let data = file.prepare_data(&dims, &sink).unwrap();
        assert_eq!(
            data.matrix[0],
            array![[0.0, 1.0], [10.0, 11.0], [20.0, 21.0]]
        );
    }

    #[test]
    fn test_assembly_recovers_intended_values() {
        let xs = [0.0, 0.25, 0.5, 0.75];
        let ys = [1.0, 2.0, 3.0];
        let f = |i: usize, j: usize| (i * i) as f64 - 3.0 * j as f64;
        for x_alt in [false, true] {
            let log = synthetic_log(&xs, &ys, x_alt, f);
            let sink = StatusSink::detached();
            let mut file = LabberFile::from_log(Path::new("scan.hdf5"), Box::new(log));
            let dims = file.compute_dimensions(&sink).unwrap();
            let data = file.prepare_data(&dims, &sink).unwrap();
            assert_eq!(data.x, xs.to_vec());
            assert_eq!(data.y, ys.to_vec());
            for ((i, j), value) in data.matrix[0].indexed_iter() {
                assert_eq!(*value, f(i, j), "x_alt {x_alt} at ({i}, {j})");
            }
        }
    }

    /// Store `f(i, j, k)` the way a sweep with the given alternation records measured
    /// channel `k`: odd channels of a y-alternating sweep are stored last entry first, and
    /// with x alternating as well their odd entries also run backwards.
    fn record_channel(
        (n_x, n_y): (usize, usize),
        k: usize,
        (x_alt, y_alt): (bool, bool),
        f: impl Fn(usize, usize, usize) -> f64,
    ) -> Array2<f64> {
        let mut recorded = Array2::zeros((n_y, n_x));
        for i in 0..n_x {
            for j in 0..n_y {
                let (row, col) = match (x_alt, y_alt) {
                    (true, true) if k % 2 == 1 && j % 2 == 1 => (n_y - 1 - j, n_x - 1 - i),
                    (true, false) if j % 2 == 1 => (j, n_x - 1 - i),
                    (false, true) if k % 2 == 1 => (n_y - 1 - j, i),
                    _ => (j, i),
                };
                recorded[[row, col]] = f(i, j, k);
            }
        }
        recorded
    }

    /// Set-point record whose row 1 mirrors row 0 when `alternating`
    fn set_point_record(values: &[f64], entries: usize, alternating: bool) -> Array2<f64> {
        let n = values.len();
        Array2::from_shape_fn((entries, n), |(e, c)| {
            if alternating && e % 2 == 1 {
                values[n - 1 - c]
            } else {
                values[c]
            }
        })
    }

    #[test]
    fn test_y_alternating_reverses_odd_channels() {
        let xs = [0.0, 1.0, 2.0];
        let log = MemoryLog::new()
            .with_step("gate", "V", xs.to_vec(), set_point_record(&xs, 2, false))
            .with_step("bias", "V", vec![0.0, 1.0], set_point_record(&xs, 2, true))
            .with_log("a", "nA", array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])
            .with_log("b", "nA", array![[10.0, 20.0, 30.0], [40.0, 50.0, 60.0]]);
        let sink = StatusSink::detached();
        let mut file = LabberFile::from_log(Path::new("scan.hdf5"), Box::new(log));
        let dims = file.compute_dimensions(&sink).unwrap();
        assert_eq!(dims.matrix_dimensions, vec![3, 2]);
        let data = file.prepare_data(&dims, &sink).unwrap();
        assert_eq!(data.matrix[0], array![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]);
        assert_eq!(
            data.matrix[1],
            array![[40.0, 10.0], [50.0, 20.0], [60.0, 30.0]]
        );
    }

    #[test]
    fn test_y_alternating_assembly_recovers_intended_values() {
        let xs = [0.0, 0.5, 1.0, 1.5];
        let ys = [-1.0, 0.0, 1.0];
        let shape = (xs.len(), ys.len());
        let f = |i: usize, j: usize, k: usize| (100 * k + 10 * i + j) as f64;
        for x_alt in [false, true] {
            let alternation = (x_alt, true);
            let log = MemoryLog::new()
                .with_step("gate", "V", xs.to_vec(), set_point_record(&xs, ys.len(), x_alt))
                .with_step("bias", "V", ys.to_vec(), set_point_record(&xs, ys.len(), true))
                .with_log("a", "nA", record_channel(shape, 0, alternation, f))
                .with_log("b", "nA", record_channel(shape, 1, alternation, f))
                .with_log("c", "nA", record_channel(shape, 2, alternation, f));
            let sink = StatusSink::detached();
            let mut file = LabberFile::from_log(Path::new("scan.hdf5"), Box::new(log));
            let dims = file.compute_dimensions(&sink).unwrap();
            let data = file.prepare_data(&dims, &sink).unwrap();
            assert_eq!(data.matrix.len(), 3);
            for (k, matrix) in data.matrix.iter().enumerate() {
                for ((i, j), value) in matrix.indexed_iter() {
                    assert_eq!(*value, f(i, j, k), "x_alt {x_alt} channel {k} at ({i}, {j})");
                }
            }
        }
    }

    #[test]
    fn test_prepare_before_dimensions_is_not_ready() {
        let log = synthetic_log(&[0.0, 1.0], &[0.0, 1.0], false, |i, j| (i + j) as f64);
        let mut file = LabberFile::from_log(Path::new("scan.hdf5"), Box::new(log));
        assert!(matches!(
            file.prepare_data(&Dimensions::default(), &StatusSink::detached()),
            Err(BufferError::NotReady)
        ));
    }

    #[test]
    fn test_plain_sweep_is_column_major_reshape() {
        let log = synthetic_log(&[0.0, 1.0, 2.0], &[5.0, 6.0], false, |i, j| {
            (7 * i + 100 * j) as f64
        });
        let raw: Vec<f64> = log.data("current").unwrap().iter().copied().collect();
        let sink = StatusSink::detached();
        let mut file = LabberFile::from_log(Path::new("scan.hdf5"), Box::new(log));
        let dims = file.compute_dimensions(&sink).unwrap();
        let data = file.prepare_data(&dims, &sink).unwrap();
        let reshaped = Array2::from_shape_vec((3, 2).f(), raw).unwrap();
        assert_eq!(data.matrix[0], reshaped);
    }

    #[test]
    fn test_truncated_log_leaves_zeros() {
        let full = synthetic_log(&[0.0, 1.0], &[0.0, 1.0, 2.0], false, |i, j| {
            (1 + i + 2 * j) as f64
        });
        let mut log = MemoryLog::new();
        for step in full.step_channels() {
            let recorded = full.data(&step.name).unwrap();
            log = log.with_step(&step.name, &step.unit, step.values, recorded);
        }
        // Only the first two entries of the measured channel were written
        let current = full.data("current").unwrap();
        log = log.with_log("current", "nA", current.slice(ndarray::s![..2, ..]).to_owned());

        let sink = StatusSink::detached();
        let mut file = LabberFile::from_log(Path::new("scan.hdf5"), Box::new(log));
        let dims = file.compute_dimensions(&sink).unwrap();
        let data = file.prepare_data(&dims, &sink).unwrap();
        assert_eq!(data.matrix[0], array![[1.0, 3.0, 0.0], [2.0, 4.0, 0.0]]);
    }

    #[test]
    fn test_two_dimensional_and_no_sweeps() {
        let log = MemoryLog::new()
            .with_step("freq", "GHz", vec![1.0, 2.0, 3.0], array![[1.0, 2.0, 3.0]])
            .with_log("S21", "dB", array![[-1.0, -2.0, -3.0]])
            .with_log("phase", "rad", array![[0.1, 0.2, 0.3]]);
        let sink = StatusSink::detached();
        let mut file = LabberFile::from_log(Path::new("scan.hdf5"), Box::new(log));
        let dims = file.compute_dimensions(&sink).unwrap();
        assert_eq!(dims.matrix_dimensions, vec![3]);
        assert_eq!(dims.axis_values.y[&1].name, "phase");
        let data = file.prepare_data(&dims, &sink).unwrap();
        assert_eq!(data.y, vec![-1.0, -2.0, -3.0]);
        assert_eq!(data.traces[1], vec![0.1, 0.2, 0.3]);

        let flat = MemoryLog::new()
            .with_step("freq", "GHz", vec![1.0], array![[1.0]])
            .with_log("S21", "dB", array![[-1.0]]);
        let mut file = LabberFile::from_log(Path::new("flat.hdf5"), Box::new(flat));
        assert!(matches!(
            file.compute_dimensions(&sink),
            Err(BufferError::LogError(LogError::NoSweepAxes))
        ));
    }

    #[cfg(not(feature = "labber"))]
    #[test]
    fn test_backend_unavailable() {
        let mut file = LabberFile::new(Path::new("scan.hdf5"));
        assert!(matches!(
            file.compute_dimensions(&StatusSink::detached()),
            Err(BufferError::LogError(LogError::OptionalBackendUnavailable))
        ));
    }
}
