use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::constants::{DAT_EXTENSION, HDF5_EXTENSION, SNIFF_LINES};
use super::error::FormatError;

/// The on-disk layouts a Buffer can be built from.
///
/// `Qtt` is never sniffed: it shares the QCoDeS body and is requested explicitly by the
/// caller. `Dummy` marks buffers built from already decoded arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatTag {
    QtLab,
    QCoDeS,
    RawMatrix,
    Labber,
    Qtt,
    Dummy,
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatTag::QtLab => "QtLab",
            FormatTag::QCoDeS => "QCoDeS",
            FormatTag::RawMatrix => "RawMatrix",
            FormatTag::Labber => "Labber",
            FormatTag::Qtt => "Qtt",
            FormatTag::Dummy => "Dummy",
        };
        write!(f, "{name}")
    }
}

/// Classify a measurement file from its extension and at most its first three lines.
pub fn sniff(path: &Path) -> Result<FormatTag, FormatError> {
    if !path.exists() {
        return Err(FormatError::BadFilePath(path.to_path_buf()));
    }
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    let lines = if extension == DAT_EXTENSION {
        read_head(path, SNIFF_LINES)?
    } else {
        vec![]
    };

    match sniff_header(&extension, &lines) {
        Some(tag) => {
            spdlog::debug!("Sniffed {} as {}", path.display(), tag);
            Ok(tag)
        }
        None => Err(FormatError::UnrecognisedFormat(path.to_path_buf())),
    }
}

/// The decision table of the sniffer, free of any IO.
///
/// `lines` are the first lines of the file with their terminators still attached.
pub fn sniff_header(extension: &str, lines: &[String]) -> Option<FormatTag> {
    if extension == HDF5_EXTENSION {
        return Some(FormatTag::Labber);
    }
    if extension != DAT_EXTENSION {
        return None;
    }
    let third = lines.get(2)?;
    let trimmed = third.trim_matches(|c: char| c == ' ' || c == '\r' || c == '\n');
    if trimmed.is_empty() {
        Some(FormatTag::QtLab)
    } else if trimmed.starts_with('#') {
        Some(FormatTag::QCoDeS)
    } else {
        Some(FormatTag::RawMatrix)
    }
}

/// Read up to `n` raw lines, keeping terminators. Invalid UTF-8 is replaced, not rejected.
fn read_head(path: &Path, n: usize) -> Result<Vec<String>, FormatError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::with_capacity(n);
    let mut bytes = Vec::new();
    while lines.len() < n {
        bytes.clear();
        if reader.read_until(b'\n', &mut bytes)? == 0 {
            break;
        }
        lines.push(String::from_utf8_lossy(&bytes).to_string());
    }
    Ok(lines)
}
