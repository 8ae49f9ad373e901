/// Extension of QtLab, QCoDeS and raw matrix text files
pub const DAT_EXTENSION: &str = "dat";
/// Extension of Labber instrument logs
pub const HDF5_EXTENSION: &str = "hdf5";

/// Default name of the metadata document stored next to QCoDeS data
pub const DEFAULT_SIDECAR_NAME: &str = "snapshot.json";

/// Suffix infix used for exported matrices, `<location>_matrix_<index>`
pub const MATRIX_EXPORT_INFIX: &str = "_matrix_";

/// Number of header lines the sniffer is allowed to read
pub const SNIFF_LINES: usize = 3;

/// Characters which mark a comment/header line in tabular files
pub const COMMENT_MARKERS: [char; 3] = ['%', '#', '\t'];

/// Minimum advance of the parse fraction before a new progress event is sent
pub const PROGRESS_FLUSH_FRAC: f32 = 0.01;

/// SI magnitude prefixes with their scalar. Order matters: the empty prefix must be first
/// and `G` (giga) must be tried before the bare `G` (gauss) base unit could match.
pub const SI_PREFIXES: [(&str, f64); 8] = [
    ("", 1.0),
    ("p", 1e-12),
    ("n", 1e-9),
    ("µ", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
];

/// Base units recognised by the unit normalizer
pub const SI_BASE_UNITS: [&str; 21] = [
    "A", "V", "Ω", "Ohm", "W", "var", "VA", "F", "H", "S", "C", "Ah", "J", "Wh", "eV", "T", "G",
    "Wb", "Hz", "dB", "s",
];
