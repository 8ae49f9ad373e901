use ndarray::Array2;

use super::axis::AxisMeta;
use super::constants::{SI_BASE_UNITS, SI_PREFIXES};

/// Resolve a unit string into its bare SI base unit and prefix scalar.
///
/// Prefixes are the outer loop, so `GHz` is giga-hertz and a lone `G` is gauss.
/// Returns None when no prefix/base combination matches exactly.
pub fn parse_unit(unit: &str) -> Option<(&'static str, f64)> {
    for (prefix, scalar) in SI_PREFIXES.iter() {
        let Some(rest) = unit.strip_prefix(prefix) else {
            continue;
        };
        for base in SI_BASE_UNITS.iter() {
            if rest == *base {
                return Some((base, *scalar));
            }
        }
    }
    None
}

/// Rewrite the unit of `meta` to its base and rescale `values` by the prefix scalar.
///
/// Returns the applied scalar, or None if the unit was not recognised (nothing changes).
pub fn normalize_values(meta: &mut AxisMeta, values: &mut [f64]) -> Option<f64> {
    let scalar = rewrite_unit(meta)?;
    if scalar != 1.0 {
        values.iter_mut().for_each(|v| *v *= scalar);
    }
    Some(scalar)
}

/// Same as [`normalize_values`] for one result matrix.
pub fn normalize_matrix(meta: &mut AxisMeta, matrix: &mut Array2<f64>) -> Option<f64> {
    let scalar = rewrite_unit(meta)?;
    if scalar != 1.0 {
        matrix.mapv_inplace(|v| v * scalar);
    }
    Some(scalar)
}

fn rewrite_unit(meta: &mut AxisMeta) -> Option<f64> {
    let (base, scalar) = parse_unit(&meta.unit)?;
    if scalar != 1.0 {
        spdlog::debug!(
            "Rewriting unit of {:?} from {} to {} (x{:e})",
            meta.name,
            meta.unit,
            base,
            scalar
        );
    }
    meta.unit = base.to_string();
    Some(scalar)
}
