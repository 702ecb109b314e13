//! Signal time series for plotting

use crate::dataset::view::FilterHandle;
use crate::dataset::Dataset;
use serde::Serialize;

/// Samples of one signal across a filtered view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSeries {
    /// Unique curve key, `"0x123.Speed"` when the identifier was given
    pub key: String,
    pub name: String,
    pub unit: Option<String>,
    pub times: Vec<f64>,
    pub values: Vec<f64>,
    pub min: f64,
    pub max: f64,
}

impl SignalSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Collect `(timestamp, physical)` pairs of `signal` from every record of the
/// view, optionally only from identifier `can_id`. Returns `None` when no
/// record carries the signal.
pub fn extract_series(
    dataset: &Dataset,
    handle: &FilterHandle,
    can_id: Option<u32>,
    signal: &str,
) -> Option<SignalSeries> {
    let mut times = Vec::new();
    let mut values = Vec::new();
    let mut unit = None;

    for index in dataset.filtered_indices(handle) {
        let record = &dataset.records()[index];
        if can_id.is_some_and(|id| id != record.frame.can_id) {
            continue;
        }
        let Some(view) = dataset.record_at(index) else {
            continue;
        };
        if let Some(reading) = view.signal(signal) {
            if unit.is_none() {
                unit = reading.unit().map(str::to_string);
            }
            times.push(record.frame.timestamp);
            values.push(reading.physical);
        }
    }

    if times.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let key = match can_id {
        Some(id) => format!("0x{:X}.{}", id, signal),
        None => signal.to_string(),
    };
    log::debug!("Series {}: {} samples", key, times.len());

    Some(SignalSeries {
        key,
        name: signal.to_string(),
        unit,
        times,
        values,
        min,
        max,
    })
}
