use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::axis::{AxisMeta, AxisValues};
use super::buffer::{BufferData, Dimensions};
use super::constants::COMMENT_MARKERS;
use super::error::BufferError;
use super::parse_status::StatusSink;
use super::table::{extend_axis, is_data_line, unique_in_order, NumericTable};

/// How the first two columns of a QtLab table are swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Column 0 is the fast (inner) sweep: it becomes y, column 1 becomes x
    InnerFirst,
    /// Column 0 is the slow (outer) sweep: it becomes x, column 1 becomes y
    OuterFirst,
    /// Only column 0 is swept; the file is 2-D
    Single,
}

impl Orientation {
    /// Decide from the first two rows which columns are swept
    pub fn detect(table: &NumericTable) -> Self {
        if table.width() < 3 {
            return Orientation::Single;
        }
        match (table.rows().first(), table.rows().get(1)) {
            (Some(r0), Some(r1)) if r0[1] == r1[1] => Orientation::InnerFirst,
            (Some(r0), Some(r1)) if r0[0] == r1[0] => Orientation::OuterFirst,
            _ => Orientation::Single,
        }
    }

    /// Table columns holding (x, y) set-points for 3-D data
    fn set_columns(&self) -> Option<(usize, usize)> {
        match self {
            Orientation::InnerFirst => Some((1, 0)),
            Orientation::OuterFirst => Some((0, 1)),
            Orientation::Single => None,
        }
    }
}

/// A QtLab `.dat` file: commented column headers followed by a numeric table.
#[derive(Debug, Clone)]
pub struct QtLabFile {
    path: PathBuf,
    table: Option<NumericTable>,
    orientation: Orientation,
}

impl QtLabFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            table: None,
            orientation: Orientation::Single,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn compute_dimensions(&mut self, sink: &StatusSink) -> Result<Dimensions, BufferError> {
        let headers = read_column_headers(&self.path)?;
        let table = NumericTable::read(&self.path, sink)?;
        self.orientation = Orientation::detect(&table);
        let header = |column: usize| {
            headers
                .get(column)
                .cloned()
                .unwrap_or_else(|| AxisMeta::new(&format!("column {}", column + 1), ""))
        };

        let dims = match self.orientation.set_columns() {
            Some((x_col, y_col)) => {
                let n_x = unique_in_order(&table.column(x_col)).len();
                let n_y = unique_in_order(&table.column(y_col)).len();
                let measured: Vec<AxisMeta> = (2..table.width()).map(header).collect();
                Dimensions {
                    matrix_dimensions: vec![n_x, n_y],
                    number_of_set_parameters: 2,
                    number_of_measured_parameters: measured.len(),
                    axis_values: AxisValues::three_dimensional(
                        header(x_col),
                        header(y_col),
                        measured,
                    ),
                }
            }
            None => {
                let measured: Vec<AxisMeta> = (1..table.width()).map(header).collect();
                Dimensions {
                    matrix_dimensions: vec![table.row_count()],
                    number_of_set_parameters: 1,
                    number_of_measured_parameters: measured.len(),
                    axis_values: AxisValues::two_dimensional(header(0), measured),
                }
            }
        };
        spdlog::debug!(
            "{} is {:?} with dimensions {:?}",
            self.path.display(),
            self.orientation,
            dims.matrix_dimensions
        );
        self.table = Some(table);
        Ok(dims)
    }

    pub fn prepare_data(
        &mut self,
        dims: &Dimensions,
        sink: &StatusSink,
    ) -> Result<BufferData, BufferError> {
        let table = match self.table.take() {
            Some(table) => table,
            None => NumericTable::read(&self.path, sink)?,
        };
        let data = match self.orientation.set_columns() {
            Some((x_col, y_col)) => assemble_grid(&table, dims, x_col, y_col, sink),
            None => assemble_traces(&table, dims),
        };
        self.table = Some(table);
        Ok(data)
    }
}

/// Pull `name: <label> [unit]` records out of the header block.
fn read_column_headers(path: &Path) -> Result<Vec<AxisMeta>, BufferError> {
    let reader = BufReader::new(File::open(path)?);
    let mut headers = Vec::new();
    for line in reader.split(b'\n') {
        let line = String::from_utf8_lossy(&line?).to_string();
        if is_data_line(&line) {
            break;
        }
        let record = line.trim_start_matches(|c: char| COMMENT_MARKERS.contains(&c) || c == ' ');
        if let Some(label) = record.strip_prefix("name:") {
            headers.push(AxisMeta::from_label(label));
        }
    }
    Ok(headers)
}

/// 3-D assembly: x is always the outer sweep, so row `i * |y| + j` holds cell `(i, j)`.
fn assemble_grid(
    table: &NumericTable,
    dims: &Dimensions,
    x_col: usize,
    y_col: usize,
    sink: &StatusSink,
) -> BufferData {
    let (n_x, n_y) = (dims.matrix_dimensions[0], dims.matrix_dimensions[1]);
    let x = extend_axis(unique_in_order(&table.column(x_col)), n_x);
    let y = extend_axis(unique_in_order(&table.column(y_col)), n_y);

    let mut matrix = vec![Array2::<f64>::zeros((n_x, n_y)); dims.number_of_measured_parameters];
    for (k, m) in matrix.iter_mut().enumerate() {
        for ((i, j), cell) in m.indexed_iter_mut() {
            if let Some(value) = table.get(i * n_y + j, 2 + k) {
                *cell = value;
            }
        }
    }
    if table.row_count() < n_x * n_y {
        sink.notice(format!(
            "File holds {} of {} grid points; missing cells are zero",
            table.row_count(),
            n_x * n_y
        ));
    }
    BufferData {
        x,
        y,
        traces: vec![],
        matrix,
    }
}

fn assemble_traces(table: &NumericTable, dims: &Dimensions) -> BufferData {
    let traces: Vec<Vec<f64>> = (1..=dims.number_of_measured_parameters)
        .map(|column| table.column(column))
        .collect();
    BufferData {
        x: table.column(0),
        y: traces.first().cloned().unwrap_or_default(),
        traces,
        matrix: vec![],
    }
}
