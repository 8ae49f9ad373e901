use std::path::Path;

use super::error::TableError;
use super::parse_status::{ProgressTracker, StatusSink};

/// A whitespace separated numeric table, as stored in every `.dat` flavour.
///
/// Blank lines and lines starting with `#` or `%` are skipped. All data rows must have
/// the same width, except that an incomplete final row (an aborted write) is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericTable {
    rows: Vec<Vec<f64>>,
    width: usize,
    dropped_tail: bool,
}

impl NumericTable {
    /// Read and parse the table at `path`, reporting progress per line
    pub fn read(path: &Path, sink: &StatusSink) -> Result<Self, TableError> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        Self::parse(&text, sink)
    }

    pub fn parse(text: &str, sink: &StatusSink) -> Result<Self, TableError> {
        let lines: Vec<&str> = text.lines().collect();
        let mut tracker = ProgressTracker::new(sink, lines.len());
        let mut table = NumericTable::default();
        let mut short_row: Option<(usize, usize)> = None;

        for (idx, line) in lines.iter().enumerate() {
            tracker.update(idx);
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('%') {
                continue;
            }
            // Tab-led lines are headers unless they carry a number
            if line.starts_with('\t') && !is_data_line(trimmed) {
                continue;
            }
            let row = parse_row(trimmed, idx + 1)?;

            if let Some((line_no, found)) = short_row {
                // A short row followed by more data is corruption, not truncation
                return Err(TableError::RaggedRow(line_no, table.width, found));
            }
            if table.rows.is_empty() {
                table.width = row.len();
            } else if row.len() != table.width {
                if row.len() < table.width {
                    short_row = Some((idx + 1, row.len()));
                    continue;
                }
                return Err(TableError::RaggedRow(idx + 1, table.width, row.len()));
            }
            table.rows.push(row);
        }
        tracker.finish();

        if let Some((line_no, found)) = short_row {
            sink.notice(format!(
                "Dropped incomplete final row on line {line_no} ({found} of {} columns)",
                table.width
            ));
            table.dropped_tail = true;
        }
        if table.rows.is_empty() {
            return Err(TableError::Empty);
        }
        Ok(table)
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, TableError> {
        let width = rows.first().map(|r| r.len()).ok_or(TableError::Empty)?;
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(TableError::RaggedRow(idx + 1, width, row.len()));
        }
        Ok(Self {
            rows,
            width,
            dropped_tail: false,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Cell at `(row, column)`; None when the row was never written
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        self.rows.get(row).and_then(|r| r.get(column)).copied()
    }

    pub fn column(&self, column: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|r| r.get(column).copied())
            .collect()
    }

    pub fn dropped_tail(&self) -> bool {
        self.dropped_tail
    }
}

/// A line holds data when it starts with a digit, or a sign or dot followed by a digit.
pub fn is_data_line(line: &str) -> bool {
    let mut chars = line.trim_start().chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') | Some('+') | Some('.') => chars
            .next()
            .is_some_and(|c| c.is_ascii_digit() || c == '.'),
        _ => false,
    }
}

pub fn parse_row(line: &str, line_no: usize) -> Result<Vec<f64>, TableError> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| TableError::ParsingError(line_no, token.to_string()))
        })
        .collect()
}

/// Distinct values in order of first appearance.
pub fn unique_in_order(values: &[f64]) -> Vec<f64> {
    let mut seen = fxhash::FxHashSet::default();
    values
        .iter()
        .copied()
        .filter(|v| seen.insert(v.to_bits()))
        .collect()
}

/// `n` linearly spaced points from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Fill an axis of length `n` from the values actually present, continuing with the last
/// known step when the file stopped early.
pub fn extend_axis(known: Vec<f64>, n: usize) -> Vec<f64> {
    let mut axis = known;
    axis.truncate(n);
    if axis.len() == n {
        return axis;
    }
    let step = match axis.len() {
        0 | 1 => 0.0,
        len => axis[len - 1] - axis[len - 2],
    };
    let mut last = axis.last().copied().unwrap_or(0.0);
    while axis.len() < n {
        last += step;
        axis.push(last);
    }
    axis
}
