use ndarray::{Array2, ArrayView1};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::axis::AxisValues;
use super::constants::{DEFAULT_SIDECAR_NAME, MATRIX_EXPORT_INFIX};
use super::error::{BufferError, ShapeError};
use super::format::{sniff, FormatTag};
use super::hints::AxisHintCollector;
use super::labber::{InstrumentLog, LabberFile};
use super::parse_status::{ParseEvent, StatusSink};
use super::qcodes::QCoDeSFile;
use super::qtlab::QtLabFile;
use super::raw_matrix::RawMatrixFile;
use super::sidecar::SidecarSchema;
use super::units::{normalize_matrix, normalize_values};

/// Shape and metadata of a measurement, known before the heavy parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dimensions {
    /// `[|x|]` for 2-D data, `[|x|, |y|]` for 3-D data
    pub matrix_dimensions: Vec<usize>,
    pub number_of_set_parameters: usize,
    pub number_of_measured_parameters: usize,
    pub axis_values: AxisValues,
}

/// The decoded numeric payload of a Buffer.
///
/// For 2-D data `traces` holds one trace per measured parameter and `y` is a copy of the
/// first one; `matrix` is empty. For 3-D data `y` holds the second set of set-points and
/// `matrix` holds one `(|x|, |y|)` array per measured parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferData {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub traces: Vec<Vec<f64>>,
    pub matrix: Vec<Array2<f64>>,
}

/// Knobs for opening a Buffer from disk
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOptions {
    /// File name of the QCoDeS metadata document
    pub sidecar_name: String,
    /// Read QCoDeS files with the qtt metadata layout
    pub qtt_metadata: bool,
    /// Rewrite units into bare SI before the buffer is ready
    pub normalize_units: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            sidecar_name: DEFAULT_SIDECAR_NAME.to_string(),
            qtt_metadata: false,
            normalize_units: false,
        }
    }
}

/// Where the data of a Buffer comes from
#[derive(Debug)]
enum Source {
    QtLab(QtLabFile),
    QCoDeS(QCoDeSFile),
    RawMatrix(RawMatrixFile),
    Labber(LabberFile),
    /// Already decoded arrays
    Decoded,
}

/// One measurement file, decoded.
///
/// A Buffer is created cheaply from a path, then [`Buffer::compute_dimensions`] reads what
/// is needed for the shape and the axis metadata and [`Buffer::prepare_data`] does the
/// heavy parse. Progress, notices and the final `Ready` go to the attached [`StatusSink`].
/// After `Ready` the buffer only changes through the one-time unit normalization.
pub struct Buffer {
    location: PathBuf,
    name: String,
    format: FormatTag,
    source: Source,
    dimensions: Option<Dimensions>,
    data: BufferData,
    textual: String,
    ready: bool,
    normalized: bool,
    normalize_on_ready: bool,
    hint_collector: Option<Box<dyn AxisHintCollector>>,
    sink: StatusSink,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("location", &self.location)
            .field("format", &self.format)
            .field("source", &self.source)
            .field("dimensions", &self.dimensions)
            .field("ready", &self.ready)
            .field("normalized", &self.normalized)
            .finish()
    }
}

impl Buffer {
    /// Sniff the file at `path` and create a Buffer for it. Nothing but the header is read.
    pub fn open(path: &Path, options: &OpenOptions) -> Result<Self, BufferError> {
        let format = match sniff(path)? {
            FormatTag::QCoDeS if options.qtt_metadata => FormatTag::Qtt,
            tag => tag,
        };
        Self::with_format(path, format, options)
    }

    /// Create a Buffer for `path`, skipping the sniffer.
    pub fn with_format(
        path: &Path,
        format: FormatTag,
        options: &OpenOptions,
    ) -> Result<Self, BufferError> {
        let source = match format {
            FormatTag::QtLab => Source::QtLab(QtLabFile::new(path)),
            FormatTag::QCoDeS => Source::QCoDeS(QCoDeSFile::new(
                path,
                &options.sidecar_name,
                SidecarSchema::Standard,
            )),
            FormatTag::Qtt => Source::QCoDeS(QCoDeSFile::new(
                path,
                &options.sidecar_name,
                SidecarSchema::Qtt,
            )),
            FormatTag::RawMatrix => Source::RawMatrix(RawMatrixFile::new(path)),
            FormatTag::Labber => Source::Labber(LabberFile::new(path)),
            FormatTag::Dummy => {
                return Err(ShapeError::MalformedShape(
                    "decoded buffers are built from arrays, not files".to_string(),
                )
                .into())
            }
        };
        let mut buffer = Self::empty(&absolute(path), format, source);
        buffer.normalize_on_ready = options.normalize_units;
        Ok(buffer)
    }

    /// A Labber buffer reading from an already opened instrument log
    pub fn from_instrument_log(location: &Path, log: Box<dyn InstrumentLog + Send>) -> Self {
        let location = absolute(location);
        Self::empty(
            &location,
            FormatTag::Labber,
            Source::Labber(LabberFile::from_log(&location, log)),
        )
    }

    /// A ready buffer wrapping arrays that were already decoded, e.g. a derived view.
    ///
    /// Non-empty `data.matrix` makes the buffer 3-D; otherwise it is 2-D and `data.y`
    /// (or `data.traces`) holds the measured values.
    pub fn from_arrays(
        name: &str,
        axis_values: AxisValues,
        data: BufferData,
    ) -> Result<Self, BufferError> {
        let mut data = data;
        let dimensions = if data.matrix.is_empty() {
            if data.traces.is_empty() {
                data.traces.push(data.y.clone());
            }
            data.y = data.traces[0].clone();
            if let Some(trace) = data.traces.iter().find(|t| t.len() != data.x.len()) {
                return Err(ShapeError::MalformedShape(format!(
                    "trace of length {} against {} x values",
                    trace.len(),
                    data.x.len()
                ))
                .into());
            }
            Dimensions {
                matrix_dimensions: vec![data.x.len()],
                number_of_set_parameters: 1,
                number_of_measured_parameters: data.traces.len(),
                axis_values,
            }
        } else {
            let shape = [data.x.len(), data.y.len()];
            if let Some(m) = data.matrix.iter().find(|m| m.shape() != shape) {
                return Err(ShapeError::MalformedShape(format!(
                    "matrix of shape {:?} against axes {:?}",
                    m.shape(),
                    shape
                ))
                .into());
            }
            Dimensions {
                matrix_dimensions: shape.to_vec(),
                number_of_set_parameters: 2,
                number_of_measured_parameters: data.matrix.len(),
                axis_values,
            }
        };

        let mut buffer = Self::empty(Path::new(name), FormatTag::Dummy, Source::Decoded);
        buffer.textual = render_textual(&data);
        buffer.data = data;
        buffer.dimensions = Some(dimensions);
        buffer.ready = true;
        Ok(buffer)
    }

    fn empty(location: &Path, format: FormatTag, source: Source) -> Self {
        let name = location
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| location.to_string_lossy().to_string());
        Self {
            location: location.to_path_buf(),
            name,
            format,
            source,
            dimensions: None,
            data: BufferData::default(),
            textual: String::new(),
            ready: false,
            normalized: false,
            normalize_on_ready: false,
            hint_collector: None,
            sink: StatusSink::detached(),
        }
    }

    /// Collector asked for axis hints if this buffer turns out to be a raw matrix
    pub fn with_hint_collector(mut self, collector: Box<dyn AxisHintCollector>) -> Self {
        self.hint_collector = Some(collector);
        self
    }

    /// Channel for progress, notices and readiness
    pub fn with_status_sink(mut self, sink: StatusSink) -> Self {
        self.sink = sink;
        self
    }

    /// Read the shape and axis metadata. Runs once; later calls are free.
    pub fn compute_dimensions(&mut self) -> Result<&Dimensions, BufferError> {
        if self.dimensions.is_none() {
            let sink = &self.sink;
            let dims = match &mut self.source {
                Source::QtLab(file) => file.compute_dimensions(sink)?,
                Source::QCoDeS(file) => file.compute_dimensions(sink)?,
                Source::RawMatrix(file) => {
                    file.compute_dimensions(self.hint_collector.take(), sink)?
                }
                Source::Labber(file) => file.compute_dimensions(sink)?,
                Source::Decoded => Dimensions::default(),
            };
            spdlog::info!(
                "{} is {}-D {} data with dimensions {:?}",
                self.name,
                dims.matrix_dimensions.len() + 1,
                self.format,
                dims.matrix_dimensions
            );
            self.dimensions = Some(dims);
        }
        self.dimensions.as_ref().ok_or(BufferError::NotReady)
    }

    /// Parse the payload and assemble axes and matrices, then signal `Ready`.
    ///
    /// Repeated calls leave a ready buffer untouched.
    pub fn prepare_data(&mut self) -> Result<(), BufferError> {
        if self.ready {
            return Ok(());
        }
        let dims = self.compute_dimensions()?.clone();
        spdlog::info!("Parsing {}", self.location.display());

        let sink = &self.sink;
        let data = match &mut self.source {
            Source::QtLab(file) => file.prepare_data(&dims, sink)?,
            Source::QCoDeS(file) => file.prepare_data(&dims, sink)?,
            Source::RawMatrix(file) => file.prepare_data(&dims, sink)?,
            Source::Labber(file) => file.prepare_data(&dims, sink)?,
            Source::Decoded => self.data.clone(),
        };
        self.textual = render_textual(&data);
        self.data = data;

        if self.normalize_on_ready {
            self.apply_normalization();
        }
        self.ready = true;
        spdlog::info!("Finished {}", self.name);
        self.sink.send(ParseEvent::Ready);
        // Nothing is reported after Ready
        self.sink = StatusSink::detached();
        Ok(())
    }

    /// Rewrite every recognised unit to its bare SI base and rescale the matching array.
    ///
    /// Applied at most once; returns false if it already was. On a buffer that is not
    /// ready yet nothing is touched: the normalization is queued for
    /// [`Buffer::prepare_data`] and false is returned.
    pub fn normalize_units(&mut self) -> bool {
        if !self.ready {
            self.normalize_on_ready = true;
            return false;
        }
        self.apply_normalization()
    }

    fn apply_normalization(&mut self) -> bool {
        if self.normalized {
            return false;
        }
        let Some(dims) = self.dimensions.as_mut() else {
            return false;
        };
        let axes = &mut dims.axis_values;
        let data = &mut self.data;
        normalize_values(&mut axes.x, &mut data.x);
        if data.matrix.is_empty() {
            for (k, meta) in axes.y.iter_mut() {
                if let Some(trace) = data.traces.get_mut(*k) {
                    normalize_values(meta, trace);
                }
            }
            if let Some(first) = data.traces.first() {
                data.y = first.clone();
            }
        } else {
            if let Some(meta) = axes.y.get_mut(&0) {
                normalize_values(meta, &mut data.y);
            }
            for (k, meta) in axes.z.iter_mut() {
                if let Some(matrix) = data.matrix.get_mut(*k) {
                    normalize_matrix(meta, matrix);
                }
            }
        }
        self.normalized = true;
        true
    }

    /// The `index`-th result matrix (the first one for None)
    pub fn get_matrix(&self, index: Option<usize>) -> Result<&Array2<f64>, BufferError> {
        if !self.ready {
            return Err(BufferError::NotReady);
        }
        let index = index.unwrap_or(0);
        self.data
            .matrix
            .get(index)
            .ok_or(BufferError::MatrixIndex(index, self.data.matrix.len()))
    }

    pub fn get_x_axis_values(&self) -> &[f64] {
        &self.data.x
    }

    pub fn get_y_axis_values(&self) -> &[f64] {
        &self.data.y
    }

    /// Every measured trace of 2-D data
    pub fn get_traces(&self) -> &[Vec<f64>] {
        &self.data.traces
    }

    /// Axis span per point, `(x[-1] - x[0]) / |x|` and the same for y. An empty axis
    /// gives 0.
    pub fn get_scale(&self) -> (f64, f64) {
        (scale(&self.data.x), scale(&self.data.y))
    }

    /// 2 for a trace, 3 for a map
    pub fn get_number_of_dimensions(&self) -> usize {
        self.get_matrix_dimensions().len() + 1
    }

    pub fn get_matrix_dimensions(&self) -> &[usize] {
        self.dimensions
            .as_ref()
            .map(|d| d.matrix_dimensions.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_number_of_set_parameters(&self) -> usize {
        self.dimensions
            .as_ref()
            .map(|d| d.number_of_set_parameters)
            .unwrap_or(0)
    }

    pub fn get_number_of_measured_parameters(&self) -> usize {
        self.dimensions
            .as_ref()
            .map(|d| d.number_of_measured_parameters)
            .unwrap_or(0)
    }

    pub fn get_axis_values(&self) -> Option<&AxisValues> {
        self.dimensions.as_ref().map(|d| &d.axis_values)
    }

    pub fn is_data_ready(&self) -> bool {
        self.ready
    }

    pub fn get_location(&self) -> &Path {
        &self.location
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_format(&self) -> FormatTag {
        self.format
    }

    pub fn textual_data_representation(&self) -> &str {
        &self.textual
    }

    /// Write the `index`-th matrix, transposed and tab separated, next to the source file
    /// as `<location>_matrix_<index>`.
    pub fn create_matrix_file(&self, index: usize) -> Result<PathBuf, BufferError> {
        let matrix = self.get_matrix(Some(index))?;
        let path = PathBuf::from(format!(
            "{}{}{}",
            self.location.display(),
            MATRIX_EXPORT_INFIX,
            index
        ));
        let mut writer = BufWriter::new(File::create(&path)?);
        for column in matrix.columns() {
            let line: Vec<String> = column.iter().map(|v| v.to_string()).collect();
            writeln!(writer, "{}", line.join("\t"))?;
        }
        writer.flush()?;
        spdlog::info!("Exported matrix {} of {} to {}", index, self.name, path.display());
        Ok(path)
    }

    /// One line describing the buffer
    pub fn summary(&self) -> String {
        let Some(dims) = &self.dimensions else {
            return format!("{} [{}] not parsed", self.name, self.format);
        };
        let axes = &dims.axis_values;
        let measured: Vec<String> = if dims.number_of_set_parameters == 2 {
            axes.z.values().map(|m| m.to_string()).collect()
        } else {
            axes.y.values().map(|m| m.to_string()).collect()
        };
        let mut line = format!(
            "{} [{}] {:?}: x = {}",
            self.name, self.format, dims.matrix_dimensions, axes.x
        );
        if dims.number_of_set_parameters == 2 {
            if let Some(y) = axes.y_primary() {
                line.push_str(&format!(", y = {y}"));
            }
        }
        line.push_str(&format!("; measured {}", measured.join(", ")));
        line
    }
}

/// `path` made absolute against the working directory, without touching the file system
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn scale(axis: &[f64]) -> f64 {
    match (axis.first(), axis.last()) {
        (Some(first), Some(last)) => (last - first) / axis.len() as f64,
        _ => 0.0,
    }
}

fn render_textual(data: &BufferData) -> String {
    if data.matrix.is_empty() {
        let mut text = format!("x: {}", ArrayView1::from(&data.x));
        for (k, trace) in data.traces.iter().enumerate() {
            text.push_str(&format!("\ny{k}: {}", ArrayView1::from(trace)));
        }
        text
    } else {
        data.matrix
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<String>>()
            .join("\n\n")
    }
}
