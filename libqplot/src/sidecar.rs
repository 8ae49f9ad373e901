use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::axis::{AxisMeta, AxisValues};
use super::error::SidecarError;

/// Which layout the metadata document follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SidecarSchema {
    /// QCoDeS loop snapshot rooted at `loop`
    Standard,
    /// qtt dataset snapshot rooted at `__dataset_metadata.arrays`
    Qtt,
}

/// Path of the sidecar that belongs to the data file at `data_path`
pub fn sidecar_path(data_path: &Path, sidecar_name: &str) -> PathBuf {
    match data_path.parent() {
        Some(parent) => parent.join(sidecar_name),
        None => PathBuf::from(sidecar_name),
    }
}

/// Read the sidecar document next to `data_path` and resolve it into axis metadata.
pub fn load_axis_values(
    data_path: &Path,
    sidecar_name: &str,
    schema: SidecarSchema,
) -> Result<AxisValues, SidecarError> {
    let path = sidecar_path(data_path, sidecar_name);
    if !path.exists() {
        return Err(SidecarError::SidecarMissing(path));
    }
    let text = std::fs::read_to_string(&path)?;
    let doc: Value = serde_json::from_str(&text)?;
    resolve(&doc, schema)
}

/// Interpret a sidecar document. Pure; the document is not modified.
pub fn resolve(doc: &Value, schema: SidecarSchema) -> Result<AxisValues, SidecarError> {
    match schema {
        SidecarSchema::Standard => resolve_loop(doc),
        SidecarSchema::Qtt => resolve_qtt(doc),
    }
}

fn resolve_loop(doc: &Value) -> Result<AxisValues, SidecarError> {
    let mut node = doc.get("loop").ok_or(SidecarError::SidecarShapeUnknown)?;
    let mut set_points = Vec::new();

    // Walk down the nested loops; each level contributes one swept parameter
    let measured = loop {
        let parameter = node
            .pointer("/sweep_values/parameter")
            .ok_or(SidecarError::SidecarShapeUnknown)?;
        set_points.push(parameter_meta(parameter).ok_or(SidecarError::SidecarShapeUnknown)?);

        let actions = node
            .get("actions")
            .and_then(Value::as_array)
            .ok_or(SidecarError::SidecarShapeUnknown)?;
        match actions.first() {
            Some(inner) if is_loop(inner) => node = inner,
            Some(_) => {
                break actions
                    .iter()
                    .filter_map(parameter_meta)
                    .collect::<Vec<AxisMeta>>()
            }
            None => return Err(SidecarError::SidecarShapeUnknown),
        }
    };

    if measured.is_empty() {
        return Err(SidecarError::SidecarShapeUnknown);
    }
    let mut set_points = set_points.into_iter();
    match (set_points.next(), set_points.next(), set_points.next()) {
        (Some(x), None, None) => Ok(AxisValues::two_dimensional(x, measured)),
        (Some(x), Some(y), None) => Ok(AxisValues::three_dimensional(x, y, measured)),
        _ => Err(SidecarError::SidecarShapeUnknown),
    }
}

fn resolve_qtt(doc: &Value) -> Result<AxisValues, SidecarError> {
    let arrays = doc
        .pointer("/__dataset_metadata/arrays")
        .and_then(Value::as_object)
        .ok_or(SidecarError::SidecarShapeUnknown)?;

    let mut x = None;
    let mut y = None;
    let mut measured = Vec::new();
    for (key, array) in arrays {
        let meta = AxisMeta::new(
            text_field(array, "label")
                .or_else(|| text_field(array, "name"))
                .unwrap_or(key),
            text_field(array, "unit").unwrap_or(""),
        );
        let is_setpoint = array
            .get("is_setpoint")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !is_setpoint {
            measured.push(meta);
            continue;
        }
        let rank = array
            .get("shape")
            .and_then(Value::as_array)
            .map(|s| s.len())
            .unwrap_or(0);
        match rank {
            1 => x = Some(meta),
            2 => y = Some(meta),
            _ => return Err(SidecarError::SidecarShapeUnknown),
        }
    }

    match (x, y) {
        (Some(x), None) if !measured.is_empty() => Ok(AxisValues::two_dimensional(x, measured)),
        (Some(x), Some(y)) if !measured.is_empty() => {
            Ok(AxisValues::three_dimensional(x, y, measured))
        }
        _ => Err(SidecarError::SidecarShapeUnknown),
    }
}

fn is_loop(node: &Value) -> bool {
    node.get("sweep_values").is_some() && node.get("actions").is_some()
}

/// Name and unit of a parameter snapshot. The label is preferred over the raw name.
fn parameter_meta(parameter: &Value) -> Option<AxisMeta> {
    let name = text_field(parameter, "label").or_else(|| text_field(parameter, "name"))?;
    Some(AxisMeta::new(
        name,
        text_field(parameter, "unit").unwrap_or(""),
    ))
}

fn text_field<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param(name: &str, label: &str, unit: &str) -> Value {
        json!({"name": name, "label": label, "unit": unit, "__class__": "qcodes.Parameter"})
    }

    #[test]
    fn test_standard_single_loop() {
        let doc = json!({
            "loop": {
                "sweep_values": {"parameter": param("gate", "Gate", "mV")},
                "actions": [param("i", "Current", "nA"), param("v", "Voltage", "µV")]
            }
        });
        let axes = resolve(&doc, SidecarSchema::Standard).unwrap();
        assert_eq!(axes.x, AxisMeta::new("Gate", "mV"));
        assert_eq!(axes.y.len(), 2);
        assert_eq!(axes.y[&1], AxisMeta::new("Voltage", "µV"));
        assert!(axes.z.is_empty());
    }

    #[test]
    fn test_standard_nested_loop() {
        let doc = json!({
            "loop": {
                "sweep_values": {"parameter": param("gate", "Gate", "mV")},
                "actions": [{
                    "sweep_values": {"parameter": param("bias", "", "V")},
                    "actions": [
                        param("i", "Current", "nA"),
                        {"__class__": "qcodes.loops.Task", "func": "print"},
                        param("g", "Conductance", "S")
                    ]
                }]
            }
        });
        let axes = resolve(&doc, SidecarSchema::Standard).unwrap();
        assert_eq!(axes.x.name, "Gate");
        assert_eq!(axes.y[&0], AxisMeta::new("bias", "V"));
        assert_eq!(axes.z.len(), 2);
        assert_eq!(axes.z[&1].name, "Conductance");
        assert!(axes.z.keys().all(|k| *k < 2));
    }

    #[test]
    fn test_qtt_arrays() {
        let doc = json!({
            "__dataset_metadata": {
                "arrays": {
                    "gate_set": {"label": "Gate", "unit": "mV", "is_setpoint": true, "shape": [2]},
                    "bias_set": {"name": "bias", "unit": "V", "is_setpoint": true, "shape": [2, 3]},
                    "current": {"label": "I", "unit": "A", "is_setpoint": false, "shape": [2, 3]},
                    "phase": {"unit": "deg", "shape": [2, 3]}
                }
            }
        });
        let axes = resolve(&doc, SidecarSchema::Qtt).unwrap();
        assert_eq!(axes.x.name, "Gate");
        assert_eq!(axes.y[&0].name, "bias");
        assert_eq!(axes.z[&0], AxisMeta::new("I", "A"));
        assert_eq!(axes.z[&1], AxisMeta::new("phase", "deg"));
    }

    #[test]
    fn test_unknown_shapes() {
        assert!(matches!(
            resolve(&json!({"something": 1}), SidecarSchema::Standard),
            Err(SidecarError::SidecarShapeUnknown)
        ));
        assert!(matches!(
            resolve(&json!({"loop": {"actions": []}}), SidecarSchema::Standard),
            Err(SidecarError::SidecarShapeUnknown)
        ));
        assert!(matches!(
            resolve(&json!({"loop": {}}), SidecarSchema::Qtt),
            Err(SidecarError::SidecarShapeUnknown)
        ));
    }

    #[test]
    fn test_missing_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("scan.dat");
        assert!(matches!(
            load_axis_values(&data, "snapshot.json", SidecarSchema::Standard),
            Err(SidecarError::SidecarMissing(_))
        ));
    }
}
