use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::axis::{AxisMeta, AxisValues};
use super::buffer::{BufferData, Dimensions};
use super::constants::SNIFF_LINES;
use super::error::{BufferError, ShapeError};
use super::parse_status::StatusSink;
use super::sidecar::{load_axis_values, SidecarSchema};
use super::table::{extend_axis, is_data_line, parse_row, NumericTable};

/// A QCoDeS (or qtt) `.dat` file.
///
/// The first three lines are comments: column names, quoted labels and the shape of the
/// sweep (`# 21\t101`). Names and units come from a JSON sidecar next to the file.
#[derive(Debug, Clone)]
pub struct QCoDeSFile {
    path: PathBuf,
    sidecar_name: String,
    schema: SidecarSchema,
    table: Option<NumericTable>,
}

impl QCoDeSFile {
    pub fn new(path: &Path, sidecar_name: &str, schema: SidecarSchema) -> Self {
        Self {
            path: path.to_path_buf(),
            sidecar_name: sidecar_name.to_string(),
            schema,
            table: None,
        }
    }

    /// Shape and metadata only; the body of the table is not read.
    pub fn compute_dimensions(&mut self, sink: &StatusSink) -> Result<Dimensions, BufferError> {
        let (head, first_row) = read_preamble(&self.path)?;
        let shape_line = head.get(SNIFF_LINES - 1).cloned().unwrap_or_default();
        let matrix_dimensions = parse_shape_line(&shape_line)?;

        let n_set = matrix_dimensions.len();
        let columns = first_row.map(|row| row.len()).unwrap_or(0);
        if columns <= n_set {
            return Err(ShapeError::MalformedShape(format!(
                "{} set-points declared but rows have {columns} columns",
                n_set
            ))
            .into());
        }
        let n_measured = columns - n_set;

        let axis_values = match load_axis_values(&self.path, &self.sidecar_name, self.schema) {
            Ok(axes) if fits_shape(&axes, n_set, n_measured) => axes,
            Ok(_) => {
                sink.notice(format!(
                    "Metadata sidecar does not describe a {}-D measurement with {n_measured} measured parameters; names and units cleared",
                    n_set + 1
                ));
                cleared_axis_values(n_set, n_measured)
            }
            Err(e) => {
                sink.notice(format!("{e}; names and units cleared"));
                cleared_axis_values(n_set, n_measured)
            }
        };

        Ok(Dimensions {
            matrix_dimensions,
            number_of_set_parameters: n_set,
            number_of_measured_parameters: n_measured,
            axis_values,
        })
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
        let data = match dims.matrix_dimensions.as_slice() {
            [n_x, n_y] => assemble_grid(&table, dims, *n_x, *n_y, sink),
            _ => assemble_traces(&table, dims, sink),
        };
        self.table = Some(table);
        Ok(data)
    }
}

/// Parse `# d1\td2 ...` into the sweep shape. Only 1 or 2 sweep dimensions are supported.
pub fn parse_shape_line(line: &str) -> Result<Vec<usize>, ShapeError> {
    let malformed = || ShapeError::MalformedShape(line.trim_end().to_string());
    let body = line.trim().strip_prefix('#').ok_or_else(malformed)?;
    let dims = body
        .split_whitespace()
        .map(|token| token.parse::<usize>())
        .collect::<Result<Vec<usize>, _>>()
        .map_err(|_| malformed())?;
    if dims.is_empty() || dims.len() > 2 || dims.contains(&0) {
        return Err(malformed());
    }
    Ok(dims)
}

/// The first lines of the file and the first data row, if any
fn read_preamble(path: &Path) -> Result<(Vec<String>, Option<Vec<f64>>), BufferError> {
    let reader = BufReader::new(File::open(path)?);
    let mut head = Vec::with_capacity(SNIFF_LINES);
    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = String::from_utf8_lossy(&line?).to_string();
        if head.len() < SNIFF_LINES {
            head.push(line.clone());
        }
        if is_data_line(&line) {
            let row = parse_row(line.trim(), idx + 1)?;
            return Ok((head, Some(row)));
        }
    }
    Ok((head, None))
}

fn fits_shape(axes: &AxisValues, n_set: usize, n_measured: usize) -> bool {
    let measured = if n_set == 2 { &axes.z } else { &axes.y };
    let set_ok = match n_set {
        2 => axes.y.len() == 1,
        _ => axes.z.is_empty(),
    };
    set_ok && !measured.is_empty() && measured.keys().all(|k| *k < n_measured)
}

fn cleared_axis_values(n_set: usize, n_measured: usize) -> AxisValues {
    let measured = vec![AxisMeta::default(); n_measured];
    if n_set == 2 {
        AxisValues::three_dimensional(AxisMeta::default(), AxisMeta::default(), measured)
    } else {
        AxisValues::two_dimensional(AxisMeta::default(), measured)
    }
}

/// Rows are written with y (column 1) as the fast sweep, so row `i * |y| + j` holds `(i, j)`.
fn assemble_grid(
    table: &NumericTable,
    dims: &Dimensions,
    n_x: usize,
    n_y: usize,
    sink: &StatusSink,
) -> BufferData {
    let x_known: Vec<f64> = (0..n_x).map_while(|i| table.get(i * n_y, 0)).collect();
    let y_known: Vec<f64> = (0..n_y).map_while(|j| table.get(j, 1)).collect();
    if x_known.len() < n_x || y_known.len() < n_y {
        sink.notice(format!(
            "Measurement stopped early; axes extrapolated from {} of {n_x} x values and {} of {n_y} y values",
            x_known.len(),
            y_known.len()
        ));
    } else if table.row_count() < n_x * n_y {
        sink.notice(format!(
            "File holds {} of {} grid points; missing cells are zero",
            table.row_count(),
            n_x * n_y
        ));
    }

    let mut matrix = vec![Array2::<f64>::zeros((n_x, n_y)); dims.number_of_measured_parameters];
    for (k, m) in matrix.iter_mut().enumerate() {
        for ((i, j), cell) in m.indexed_iter_mut() {
            if let Some(value) = table.get(i * n_y + j, 2 + k) {
                *cell = value;
            }
        }
    }
    BufferData {
        x: extend_axis(x_known, n_x),
        y: extend_axis(y_known, n_y),
        traces: vec![],
        matrix,
    }
}

fn assemble_traces(table: &NumericTable, dims: &Dimensions, sink: &StatusSink) -> BufferData {
    let n = dims.matrix_dimensions.first().copied().unwrap_or(0);
    if table.row_count() < n {
        sink.notice(format!(
            "Measurement stopped early after {} of {n} points",
            table.row_count()
        ));
    }
    let mut x = table.column(0);
    x.truncate(n);
    let traces: Vec<Vec<f64>> = (1..=dims.number_of_measured_parameters)
        .map(|column| {
            let mut trace = table.column(column);
            trace.resize(n, 0.0);
            trace
        })
        .collect();
    BufferData {
        x: extend_axis(x, n),
        y: traces.first().cloned().unwrap_or_default(),
        traces,
        matrix: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_status::ParseEvent;
    use std::io::Write;
    use std::sync::mpsc;

    const SIDECAR_3D: &str = r#"{
        "loop": {
            "sweep_values": {"parameter": {"name": "gate", "label": "Gate", "unit": "V"}},
            "actions": [{
                "sweep_values": {"parameter": {"name": "bias", "label": "Bias", "unit": "mV"}},
                "actions": [{"name": "i", "label": "Current", "unit": "nA"}]
            }]
        }
    }"#;

    fn write_dat(dir: &Path, shape: &str, body: &str) -> PathBuf {
        let path = dir.join("scan.dat");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            "# gate_set\tbias_set\tcurrent\n# \"Gate\"\t\"Bias\"\t\"Current\"\n{shape}\n{body}"
        )
        .unwrap();
        path
    }

    fn write_sidecar(dir: &Path, text: &str) {
        std::fs::write(dir.join("snapshot.json"), text).unwrap();
    }

    #[test]
    fn test_parse_shape_line() {
        assert_eq!(parse_shape_line("# 2\t3\n").unwrap(), vec![2, 3]);
        assert_eq!(parse_shape_line("# 11").unwrap(), vec![11]);
        assert!(parse_shape_line("2\t3").is_err());
        assert!(parse_shape_line("# two").is_err());
        assert!(parse_shape_line("# 2 3 4").is_err());
        assert!(parse_shape_line("#").is_err());
    }

    #[test]
    fn test_full_grid() {
        let dir = tempfile::tempdir().unwrap();
        let body = "0 10 1\n0 20 2\n0 30 3\n1 10 4\n1 20 5\n1 30 6\n";
        let path = write_dat(dir.path(), "# 2\t3", body);
        write_sidecar(dir.path(), SIDECAR_3D);
        let sink = StatusSink::detached();

        let mut file = QCoDeSFile::new(&path, "snapshot.json", SidecarSchema::Standard);
        let dims = file.compute_dimensions(&sink).unwrap();
        assert_eq!(dims.matrix_dimensions, vec![2, 3]);
        assert_eq!(dims.number_of_set_parameters, 2);
        assert_eq!(dims.number_of_measured_parameters, 1);
        assert_eq!(dims.axis_values.x, AxisMeta::new("Gate", "V"));
        assert_eq!(dims.axis_values.z[&0].unit, "nA");

        let data = file.prepare_data(&dims, &sink).unwrap();
        assert_eq!(data.x, vec![0.0, 1.0]);
        assert_eq!(data.y, vec![10.0, 20.0, 30.0]);
        assert_eq!(data.matrix[0].row(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(data.matrix[0].row(1).to_vec(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_truncated_grid_extrapolates() {
        let dir = tempfile::tempdir().unwrap();
        // Declared 3 x 2, only the first outer step and a half were written
        let body = "0 10 1\n0 20 2\n0.5 10 3\n";
        let path = write_dat(dir.path(), "# 3\t2", body);
        write_sidecar(dir.path(), SIDECAR_3D);
        let (tx, rx) = mpsc::channel();
        let sink = StatusSink::new(tx, 0, 0, "scan.dat");

        let mut file = QCoDeSFile::new(&path, "snapshot.json", SidecarSchema::Standard);
        let dims = file.compute_dimensions(&sink).unwrap();
        let data = file.prepare_data(&dims, &sink).unwrap();
        drop(sink);

        assert_eq!(data.x, vec![0.0, 0.5, 1.0]);
        assert_eq!(data.y, vec![10.0, 20.0]);
        assert_eq!(data.matrix[0].shape(), &[3, 2]);
        assert_eq!(data.matrix[0][[1, 0]], 3.0);
        assert_eq!(data.matrix[0][[1, 1]], 0.0);
        assert_eq!(data.matrix[0][[2, 1]], 0.0);
        assert!(rx
            .iter()
            .any(|status| matches!(status.event, ParseEvent::Notice(_))));
    }

    #[test]
    fn test_missing_sidecar_clears_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dat(dir.path(), "# 3", "0 1 2\n1 2 3\n2 3 4\n");
        let (tx, rx) = mpsc::channel();
        let sink = StatusSink::new(tx, 0, 0, "scan.dat");

        let mut file = QCoDeSFile::new(&path, "snapshot.json", SidecarSchema::Standard);
        let dims = file.compute_dimensions(&sink).unwrap();
        drop(sink);
        assert_eq!(dims.matrix_dimensions, vec![3]);
        assert_eq!(dims.number_of_measured_parameters, 2);
        assert_eq!(dims.axis_values.y.len(), 2);
        assert!(dims.axis_values.y.values().all(|m| m.name.is_empty()));
        assert!(rx
            .iter()
            .any(|status| matches!(status.event, ParseEvent::Notice(_))));

        let data = file
            .prepare_data(&dims, &StatusSink::detached())
            .unwrap();
        assert_eq!(data.x, vec![0.0, 1.0, 2.0]);
        assert_eq!(data.traces[1], vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mismatched_sidecar_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        // A 3-D sidecar next to a 2-D file
        let path = write_dat(dir.path(), "# 2", "0 1\n1 2\n");
        write_sidecar(dir.path(), SIDECAR_3D);
        let mut file = QCoDeSFile::new(&path, "snapshot.json", SidecarSchema::Standard);
        let dims = file.compute_dimensions(&StatusSink::detached()).unwrap();
        assert!(dims.axis_values.z.is_empty());
        assert_eq!(dims.axis_values.x, AxisMeta::default());
    }

    #[test]
    fn test_malformed_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dat(dir.path(), "# two\tthree", "0 1 2\n");
        let mut file = QCoDeSFile::new(&path, "snapshot.json", SidecarSchema::Standard);
        assert!(matches!(
            file.compute_dimensions(&StatusSink::detached()),
            Err(BufferError::ShapeError(_))
        ));
    }
}
