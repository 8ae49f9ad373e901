//! # libqplot
//!
//! libqplot is the data-ingestion layer of qplot, a viewer for quantum-transport
//! measurements. It takes the files written by the common lab acquisition frameworks
//! (QtLab, QCoDeS, qtt, Labber, or a bare matrix dumped from anywhere), works out what was
//! swept and what was measured, and hands back a [`buffer::Buffer`]: axis set-points, one
//! result matrix (or trace) per measured parameter, and the name and unit of every axis.
//!
//! ## Building
//!
//! The text formats need nothing but the Rust toolchain. Labber `.hdf5` logs are read
//! through the `hdf5` crate, which needs an HDF5 install on the system; that reader is
//! behind the `labber` cargo feature:
//!
//! ```text
//! cargo build --features labber
//! ```
//!
//! Without the feature a Labber file is still recognised but fails to load with
//! `OptionalBackendUnavailable`. If HDF5 is installed to a custom location, point
//! `HDF5_DIR` at it in `.cargo/config.toml`:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//! ```
//!
//! ## Formats
//!
//! The format of a file is decided from its extension and at most its first three lines:
//!
//! - `.hdf5`: Labber instrument log
//! - `.dat` with an empty third line: QtLab. Column headers are comment records of the form
//! `name: gate voltage (mV)`.
//! - `.dat` with a third line starting with `#`: QCoDeS. The third line holds the sweep
//! shape, e.g. `# 21\t101`; names and units come from `snapshot.json` next to the file (or
//! the qtt layout of it when `qtt_metadata` is set).
//! - any other `.dat`: a raw matrix. Rows are x, columns are y, and the axis ranges are
//! asked for through an [`hints::AxisHintCollector`].
//!
//! Files which stopped early (an aborted sweep) still load; the cells that were never
//! written are zero and a notice is sent on the status channel.
//!
//! ## Units
//!
//! With `normalize_units` set, every recognised unit (`mV`, `nA`, `GHz`, ...) is rewritten
//! to its bare SI base and the matching data is rescaled, exactly once per buffer.
//!
//! ## Configuration
//!
//! The configuration is stored as YAML:
//!
//! ```yml
//! data_path: /path/to/measurements
//! recursive: true
//! n_threads: 4
//! sidecar_name: snapshot.json
//! qtt_metadata: false
//! normalize_units: true
//! export_matrices: false
//! raw_matrix_hints: null
//! ```
//!
//! `raw_matrix_hints` may hold one set of axis hints used for every raw matrix. When it is
//! `null` the CLI asks on the terminal.
//!
//! ## Output
//!
//! With `export_matrices` set, every 3-D result matrix is written transposed next to its
//! source as `<file>_matrix_<index>`. The library logs through `spdlog`; the CLI writes
//! these diagnostics to `qplot.log`.
pub mod axis;
pub mod buffer;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod format;
pub mod hints;
pub mod labber;
#[cfg(feature = "labber")]
pub mod labber_hdf;
pub mod parse_status;
pub mod process;
pub mod qcodes;
pub mod qtlab;
pub mod raw_matrix;
pub mod sidecar;
pub mod table;
pub mod units;
