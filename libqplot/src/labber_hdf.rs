use hdf5::types::FixedAscii;
use hdf5::{File, H5Type};
use ndarray::Array2;
use std::path::Path;

use super::error::LogError;
use super::labber::MemoryLog;
use super::table::unique_in_order;

const DATA_NAME: &str = "Data/Data";
const CHANNEL_NAMES_NAME: &str = "Data/Channel names";
const CHANNELS_NAME: &str = "Channels";
const STEP_LIST_NAME: &str = "Step list";
const LOG_LIST_NAME: &str = "Log list";

type Name = FixedAscii<256>;

#[derive(H5Type, Clone, Debug)]
#[repr(C)]
struct ChannelName {
    name: Name,
}

#[derive(H5Type, Clone, Debug)]
#[repr(C)]
struct ChannelEntry {
    name: Name,
    #[hdf5(rename = "unitPhys")]
    unit: Name,
}

#[derive(H5Type, Clone, Debug)]
#[repr(C)]
struct ListEntry {
    channel_name: Name,
}

/// Read a Labber log into memory.
///
/// `Data/Data` has shape `(points, channels, entries)`; column `c` of it belongs to the
/// channel named by row `c` of `Data/Channel names`.
pub fn read_log(path: &Path) -> Result<MemoryLog, LogError> {
    let file = File::open(path)?;

    let data = file.dataset(DATA_NAME)?;
    let shape = data.shape();
    let [n_points, n_channels, n_entries] = shape[..] else {
        return Err(LogError::ShapeMismatch(DATA_NAME.to_string()));
    };
    let raw: Vec<f64> = data.read_raw()?;

    let recorded_names: Vec<String> = file
        .dataset(CHANNEL_NAMES_NAME)?
        .read_raw::<ChannelName>()?
        .iter()
        .map(|c| c.name.as_str().to_string())
        .collect();
    if recorded_names.len() != n_channels {
        return Err(LogError::ShapeMismatch(CHANNEL_NAMES_NAME.to_string()));
    }
    let units: Vec<(String, String)> = file
        .dataset(CHANNELS_NAME)?
        .read_raw::<ChannelEntry>()?
        .iter()
        .map(|c| (c.name.as_str().to_string(), c.unit.as_str().to_string()))
        .collect();
    let unit_of = |name: &str| {
        units
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, u)| u.as_str())
            .unwrap_or("")
    };

    // Entries are rows, points are columns
    let recorded = |name: &str| -> Result<Array2<f64>, LogError> {
        let c = recorded_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| LogError::UnknownChannel(name.to_string()))?;
        Ok(Array2::from_shape_fn((n_entries, n_points), |(e, p)| {
            raw[(p * n_channels + c) * n_entries + e]
        }))
    };

    let mut log = MemoryLog::new();
    for entry in file.dataset(STEP_LIST_NAME)?.read_raw::<ListEntry>()? {
        let name = entry.channel_name.as_str();
        // Step channels that were held fixed are not recorded in the data table
        let Ok(values) = recorded(name) else {
            continue;
        };
        let set_points = unique_in_order(values.as_slice().unwrap_or(&[]));
        log = log.with_step(name, unit_of(name), set_points, values);
    }
    for entry in file.dataset(LOG_LIST_NAME)?.read_raw::<ListEntry>()? {
        let name = entry.channel_name.as_str();
        log = log.with_log(name, unit_of(name), recorded(name)?);
    }
    spdlog::info!(
        "Read Labber log {} with {} entries of {} points",
        path.display(),
        n_entries,
        n_points
    );
    Ok(log)
}
