use ndarray::Array2;
use std::path::{Path, PathBuf};

use super::axis::AxisValues;
use super::buffer::{BufferData, Dimensions};
use super::error::{BufferError, HintError};
use super::hints::{collect_hints, AxisHintCollector, AxisHints, HintRequest};
use super::parse_status::StatusSink;
use super::table::{linspace, NumericTable};

/// A bare numeric matrix with no header at all.
///
/// Rows map to x, columns to y. Because nothing in the file says what was swept, the
/// axis ranges and names are asked for through an [`AxisHintCollector`].
#[derive(Debug, Clone)]
pub struct RawMatrixFile {
    path: PathBuf,
    table: Option<NumericTable>,
    hints: Option<AxisHints>,
}

impl RawMatrixFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            table: None,
            hints: None,
        }
    }

    /// Read the matrix, then block until the collector submits axis hints.
    pub fn compute_dimensions(
        &mut self,
        collector: Option<Box<dyn AxisHintCollector>>,
        sink: &StatusSink,
    ) -> Result<Dimensions, BufferError> {
        let table = NumericTable::read(&self.path, sink)?;
        let matrix_dimensions = vec![table.row_count(), table.width()];

        let hints = match (&self.hints, collector) {
            (Some(hints), _) => hints.clone(),
            (None, Some(collector)) => {
                let request = HintRequest {
                    location: self.path.clone(),
                    name: file_name(&self.path),
                    matrix_dimensions: matrix_dimensions.clone(),
                };
                spdlog::info!("Waiting for axis hints for {}", self.path.display());
                collect_hints(collector, request)?
            }
            (None, None) => return Err(HintError::Abandoned.into()),
        };

        let axis_values = AxisValues::three_dimensional(
            hints.x.meta.clone(),
            hints.y.meta.clone(),
            vec![hints.z.clone()],
        );
        self.hints = Some(hints);
        self.table = Some(table);
        Ok(Dimensions {
            matrix_dimensions,
            number_of_set_parameters: 2,
            number_of_measured_parameters: 1,
            axis_values,
        })
    }

    pub fn prepare_data(
        &mut self,
        dims: &Dimensions,
        sink: &StatusSink,
    ) -> Result<BufferData, BufferError> {
        let hints = self.hints.as_ref().ok_or(BufferError::NotReady)?;
        let [n_x, n_y] = dims.matrix_dimensions[..] else {
            return Err(BufferError::NotReady);
        };
        let table = match self.table.take() {
            Some(table) => table,
            None => NumericTable::read(&self.path, sink)?,
        };
        let mut matrix = Array2::<f64>::zeros((n_x, n_y));
        for ((i, j), cell) in matrix.indexed_iter_mut() {
            if let Some(value) = table.get(i, j) {
                *cell = value;
            }
        }
        let data = BufferData {
            x: linspace(hints.x.start, hints.x.end, n_x),
            y: linspace(hints.y.start, hints.y.end, n_y),
            traces: vec![],
            matrix: vec![matrix],
        };
        self.table = Some(table);
        Ok(data)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
