//! Axis hints for formats that carry no set-points (raw matrices).
//!
//! A Buffer never talks to a dialog directly. It hands an [`AxisHintCollector`] a request
//! and a `submitted` channel, drops the collector and waits for exactly one completed
//! [`AxisHints`] record. The collector may answer immediately (fixed hints from the
//! configuration) or forward the request to whatever thread owns the user interaction.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};

use super::axis::AxisMeta;
use super::error::HintError;

/// One swept axis as typed by the user; `start` and `end` are still text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAxisHint {
    pub start: String,
    pub end: String,
    pub name: String,
    pub unit: String,
}

/// The full form: two swept axes and the measured quantity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAxisHints {
    pub x: RawAxisHint,
    pub y: RawAxisHint,
    pub z: AxisMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisHint {
    pub start: f64,
    pub end: f64,
    pub meta: AxisMeta,
}

/// A validated hint record, ready to generate axes from
#[derive(Debug, Clone, PartialEq)]
pub struct AxisHints {
    pub x: AxisHint,
    pub y: AxisHint,
    pub z: AxisMeta,
}

impl RawAxisHint {
    fn validate(&self, axis: &str) -> Result<AxisHint, HintError> {
        let number = |field: &str, value: &str| {
            value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    HintError::InvalidAxisHint(format!("{axis}.{field}"), value.to_string())
                })
        };
        Ok(AxisHint {
            start: number("start", &self.start)?,
            end: number("end", &self.end)?,
            meta: AxisMeta::new(&self.name, &self.unit),
        })
    }
}

impl RawAxisHints {
    /// Check that every `start`/`end` is a real number
    pub fn validate(&self) -> Result<AxisHints, HintError> {
        Ok(AxisHints {
            x: self.x.validate("x")?,
            y: self.y.validate("y")?,
            z: self.z.clone(),
        })
    }
}

/// What the collector is asked about
#[derive(Debug, Clone, PartialEq)]
pub struct HintRequest {
    pub location: PathBuf,
    pub name: String,
    pub matrix_dimensions: Vec<usize>,
}

/// Something able to elicit axis hints, typically from a user.
pub trait AxisHintCollector: Send {
    /// Start collecting hints for `request`. The completed record is published exactly once
    /// through `submitted`; dropping `submitted` without sending abandons the request.
    fn request_axis_hints(&mut self, request: HintRequest, submitted: Sender<AxisHints>);
}

/// Ask `collector` for hints and wait for the submitted record.
///
/// The collector is consumed so no reference to it outlives the interaction.
pub fn collect_hints(
    collector: Box<dyn AxisHintCollector>,
    request: HintRequest,
) -> Result<AxisHints, HintError> {
    let (tx, rx) = mpsc::channel();
    let mut collector = collector;
    collector.request_axis_hints(request, tx);
    drop(collector);
    rx.recv().map_err(|_| HintError::Abandoned)
}

/// Collector answering every request with the same, pre-validated hints
#[derive(Debug, Clone)]
pub struct FixedHints {
    hints: AxisHints,
}

impl FixedHints {
    pub fn new(raw: &RawAxisHints) -> Result<Self, HintError> {
        Ok(Self {
            hints: raw.validate()?,
        })
    }
}

impl AxisHintCollector for FixedHints {
    fn request_axis_hints(&mut self, _request: HintRequest, submitted: Sender<AxisHints>) {
        if submitted.send(self.hints.clone()).is_err() {
            spdlog::warn!("Axis hints were submitted after the requesting buffer went away");
        }
    }
}

/// A request waiting for the interacting thread to fill it in.
#[derive(Debug)]
pub struct PendingHints {
    pub request: HintRequest,
    submitted: Sender<AxisHints>,
}

impl PendingHints {
    /// Validate `raw` and, if it is complete, publish it.
    ///
    /// On an invalid hint nothing is published and the request is handed back so the
    /// caller can prompt again.
    pub fn submit(self, raw: &RawAxisHints) -> Result<(), (Self, HintError)> {
        match raw.validate() {
            Ok(hints) => {
                if self.submitted.send(hints).is_err() {
                    spdlog::warn!("Buffer {} stopped waiting for axis hints", self.request.name);
                }
                Ok(())
            }
            Err(e) => Err((self, e)),
        }
    }
}

/// Collector that forwards each request to another thread, e.g. the one owning the terminal.
#[derive(Debug, Clone)]
pub struct ForwardingCollector {
    tx: Sender<PendingHints>,
}

impl ForwardingCollector {
    pub fn new(tx: Sender<PendingHints>) -> Self {
        Self { tx }
    }
}

impl AxisHintCollector for ForwardingCollector {
    fn request_axis_hints(&mut self, request: HintRequest, submitted: Sender<AxisHints>) {
        let pending = PendingHints { request, submitted };
        if self.tx.send(pending).is_err() {
            spdlog::error!("No one is listening for axis hint requests");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_bias_hints() -> RawAxisHints {
        RawAxisHints {
            x: RawAxisHint {
                start: "0".to_string(),
                end: "2".to_string(),
                name: "gate".to_string(),
                unit: "V".to_string(),
            },
            y: RawAxisHint {
                start: "0".to_string(),
                end: "1".to_string(),
                name: "bias".to_string(),
                unit: "V".to_string(),
            },
            z: AxisMeta::new("I", "A"),
        }
    }

    fn request() -> HintRequest {
        HintRequest {
            location: PathBuf::from("/data/raw.dat"),
            name: "raw.dat".to_string(),
            matrix_dimensions: vec![3, 2],
        }
    }

    #[test]
    fn test_validate() {
        let hints = gate_bias_hints().validate().unwrap();
        assert_eq!(hints.x.end, 2.0);
        assert_eq!(hints.y.meta.name, "bias");

        let mut raw = gate_bias_hints();
        raw.y.end = "one".to_string();
        assert_eq!(
            raw.validate(),
            Err(HintError::InvalidAxisHint("y.end".to_string(), "one".to_string()))
        );
    }

    #[test]
    fn test_fixed_hints_collect() {
        let collector = FixedHints::new(&gate_bias_hints()).unwrap();
        let hints = collect_hints(Box::new(collector), request()).unwrap();
        assert_eq!(hints.z.name, "I");
    }

    #[test]
    fn test_forwarding_reprompts_on_invalid() {
        let (tx, rx) = mpsc::channel::<PendingHints>();
        let ui = std::thread::spawn(move || {
            let pending = rx.recv().unwrap();
            let mut bad = gate_bias_hints();
            bad.x.start = "".to_string();
            // Invalid input does not publish and hands the request back
            let (pending, err) = pending.submit(&bad).unwrap_err();
            assert!(matches!(err, HintError::InvalidAxisHint(_, _)));
            pending.submit(&gate_bias_hints()).unwrap();
        });
        let hints = collect_hints(Box::new(ForwardingCollector::new(tx)), request()).unwrap();
        ui.join().unwrap();
        assert_eq!(hints.x.start, 0.0);
    }

    #[test]
    fn test_abandoned_request() {
        let (tx, rx) = mpsc::channel::<PendingHints>();
        let ui = std::thread::spawn(move || {
            let pending = rx.recv().unwrap();
            drop(pending);
        });
        let result = collect_hints(Box::new(ForwardingCollector::new(tx)), request());
        ui.join().unwrap();
        assert_eq!(result, Err(HintError::Abandoned));
    }
}
