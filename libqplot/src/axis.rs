use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name and unit of one axis of a measurement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMeta {
    pub name: String,
    pub unit: String,
}

impl AxisMeta {
    pub fn new(name: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
        }
    }

    /// Build from a header label such as `gate voltage (mV)` or `I [nA]`.
    pub fn from_label(label: &str) -> Self {
        let (name, unit) = split_label_unit(label);
        Self { name, unit }
    }
}

impl fmt::Display for AxisMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.unit)
        }
    }
}

/// Axis metadata of a Buffer.
///
/// `y` holds one entry per measured parameter for 2-D data and a single entry (index 0)
/// for the second swept axis of 3-D data. `z` holds one entry per measured matrix and is
/// only populated for 3-D data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisValues {
    pub x: AxisMeta,
    pub y: BTreeMap<usize, AxisMeta>,
    pub z: BTreeMap<usize, AxisMeta>,
}

impl AxisValues {
    /// Metadata for a 2-D measurement, one `y` entry per measured parameter
    pub fn two_dimensional(x: AxisMeta, measured: Vec<AxisMeta>) -> Self {
        Self {
            x,
            y: measured.into_iter().enumerate().collect(),
            z: BTreeMap::new(),
        }
    }

    /// Metadata for a 3-D measurement, one `z` entry per measured matrix
    pub fn three_dimensional(x: AxisMeta, y: AxisMeta, measured: Vec<AxisMeta>) -> Self {
        Self {
            x,
            y: BTreeMap::from([(0, y)]),
            z: measured.into_iter().enumerate().collect(),
        }
    }

    /// Metadata of the primary `y` entry (the second set-point or first measured parameter)
    pub fn y_primary(&self) -> Option<&AxisMeta> {
        self.y.get(&0)
    }
}

/// Split a header label into its name and the unit held by its final `()` or `[]` group.
///
/// Brackets are matched by depth so that `f (x) [Hz]` keeps `f (x)` as name and a label
/// which merely ends with an unbalanced bracket is left whole.
pub fn split_label_unit(label: &str) -> (String, String) {
    let trimmed = label.trim();
    let (open, close) = match trimmed.chars().last() {
        Some(')') => ('(', ')'),
        Some(']') => ('[', ']'),
        _ => return (trimmed.to_string(), String::new()),
    };

    let mut depth = 0usize;
    for (idx, c) in trimmed.char_indices().rev() {
        if c == close {
            depth += 1;
        } else if c == open {
            depth -= 1;
            if depth == 0 {
                let name = trimmed[..idx].trim();
                let unit = trimmed[idx + open.len_utf8()..trimmed.len() - close.len_utf8()].trim();
                if name.is_empty() {
                    // The whole label is a bracket group; it is a name, not a unit
                    return (trimmed.to_string(), String::new());
                }
                return (name.to_string(), unit.to_string());
            }
        }
    }
    (trimmed.to_string(), String::new())
}
