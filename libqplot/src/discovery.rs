use std::path::{Path, PathBuf};

use super::config::Config;
use super::constants::{DAT_EXTENSION, HDF5_EXTENSION, MATRIX_EXPORT_INFIX};
use super::error::DiscoveryError;

/// The measurement files found under a data directory, in path order.
#[derive(Debug, Clone, Default)]
pub struct FileStack {
    files: Vec<(PathBuf, u64)>,
    total_data_size_bytes: u64,
}

impl FileStack {
    /// Walk the configured data path and collect every `.dat` and `.hdf5` file.
    ///
    /// Sidecars and previously exported matrices are skipped.
    pub fn new(config: &Config) -> Result<Self, DiscoveryError> {
        if !config.data_path.is_dir() {
            return Err(DiscoveryError::BadDataPath(config.data_path.clone()));
        }
        let mut files = Vec::new();
        Self::get_file_stack(&config.data_path, config.recursive, &mut files)?;
        files.sort();
        let total_data_size_bytes = files.iter().map(|(_, bytes)| bytes).sum();
        spdlog::info!(
            "Found {} measurement files with total size {}",
            files.len(),
            human_bytes::human_bytes(total_data_size_bytes as f64)
        );
        Ok(Self {
            files,
            total_data_size_bytes,
        })
    }

    fn get_file_stack(
        parent_path: &Path,
        recursive: bool,
        file_list: &mut Vec<(PathBuf, u64)>,
    ) -> Result<(), DiscoveryError> {
        for item in parent_path.read_dir()? {
            let item_path = item?.path();
            if item_path.is_dir() {
                if recursive {
                    Self::get_file_stack(&item_path, recursive, file_list)?;
                }
                continue;
            }
            if is_measurement_file(&item_path) {
                let bytes = item_path.metadata()?.len();
                file_list.push((item_path, bytes));
            }
        }
        Ok(())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|(path, _)| path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get_total_data_size(&self) -> &u64 {
        &self.total_data_size_bytes
    }
}

/// A `.dat` or `.hdf5` file that is not one of our own matrix exports
fn is_measurement_file(path: &Path) -> bool {
    let Some(extension) = path.extension() else {
        return false;
    };
    if extension != DAT_EXTENSION && extension != HDF5_EXTENSION {
        return false;
    }
    !path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().contains(MATRIX_EXPORT_INFIX))
}
