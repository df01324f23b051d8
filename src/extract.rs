//! Value and threshold extraction from alert webhook entries.
//!
//! Grafana has encoded the evaluated value in several ways over time, so
//! resolution is an ordered list of strategies, each returning an optional
//! number. The first strategy that yields a finite number wins and its
//! source is logged. Failures never abort: the field is left absent.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::{AlertEvent, RawAlert};

// ---

/// Computed (reduced) expression, preferred over the raw query.
const REDUCED_REF: &str = "B";
/// Raw query expression.
const QUERY_REF: &str = "A";

static VAR_B_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    // One entry is `[ var='B' labels={...} value=30.03 ]`; stop at its `]`.
    Regex::new(r"var='B'[^\]]*?\bvalue=(-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)")
        .expect("static regex is valid")
});

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    ReducedValue,
    QueryValue,
    ValueStringVar,
    ValueStringBare,
    LenientValues,
}

/// Where a threshold came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSource {
    Annotation,
    WrappedAnnotation,
    Label,
}

type ValueStrategy = fn(&RawAlert) -> Option<(f64, ValueSource)>;

/// Strategies in priority order.
const VALUE_STRATEGIES: &[ValueStrategy] = &[
    from_values_map,
    from_value_string_var,
    from_value_string_bare,
    from_values_map_lenient,
];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Extracted {
    pub value: Option<(f64, ValueSource)>,
    pub threshold: Option<(f64, ThresholdSource)>,
}

/// Resolve `(value, threshold)` for one alert.
pub fn extract(alert: &RawAlert) -> Extracted {
    // ---
    let value = VALUE_STRATEGIES.iter().find_map(|strategy| strategy(alert));
    let threshold = extract_threshold(alert);

    match value {
        Some((v, source)) => tracing::debug!(value = v, ?source, "Resolved alert value"),
        None => tracing::debug!("No alert value found in any known field"),
    }

    Extracted { value, threshold }
}

/// Build the [`AlertEvent`] the debounce logic consumes.
pub fn to_event(alert: &RawAlert) -> AlertEvent {
    // ---
    let extracted = extract(alert);

    let uid = alert
        .fingerprint
        .clone()
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let title = string_field(alert.annotations.get("summary"))
        .or_else(|| string_field(alert.labels.get("alertname")))
        .unwrap_or_else(|| "Alert".to_string());

    AlertEvent {
        uid,
        title,
        status: alert.status.unwrap_or_default(),
        value: extracted.value.map(|(v, _)| v),
        threshold: extracted.threshold.map(|(t, _)| t),
        labels: alert.labels.clone(),
        annotations: alert.annotations.clone(),
    }
}

fn string_field(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn number(v: &Value) -> Option<f64> {
    v.as_f64().and_then(finite)
}

/// A number, or a string holding one.
fn lenient_number(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(finite),
        other => number(other),
    }
}

fn value_string(alert: &RawAlert) -> Option<String> {
    match alert.value_string.as_ref()? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn from_values_map(alert: &RawAlert) -> Option<(f64, ValueSource)> {
    // ---
    let values = alert.values.as_ref()?;
    if let Some(v) = values.get(REDUCED_REF).and_then(number) {
        return Some((v, ValueSource::ReducedValue));
    }
    values
        .get(QUERY_REF)
        .and_then(number)
        .map(|v| (v, ValueSource::QueryValue))
}

fn from_value_string_var(alert: &RawAlert) -> Option<(f64, ValueSource)> {
    // ---
    let text = value_string(alert)?;
    let captured = VAR_B_VALUE.captures(&text)?.get(1)?.as_str();
    match captured.parse::<f64>() {
        Ok(v) => finite(v).map(|v| (v, ValueSource::ValueStringVar)),
        Err(e) => {
            tracing::warn!("Could not parse value {:?} from valueString: {}", captured, e);
            None
        }
    }
}

fn from_value_string_bare(alert: &RawAlert) -> Option<(f64, ValueSource)> {
    // ---
    let text = value_string(alert)?;
    match text.trim().parse::<f64>() {
        Ok(v) => finite(v).map(|v| (v, ValueSource::ValueStringBare)),
        Err(_) => {
            tracing::warn!("Unrecognized valueString format: {}", text);
            None
        }
    }
}

/// Final fallback: accept string-encoded numbers in `values`.
fn from_values_map_lenient(alert: &RawAlert) -> Option<(f64, ValueSource)> {
    // ---
    let values = alert.values.as_ref()?;
    values
        .get(REDUCED_REF)
        .and_then(lenient_number)
        .or_else(|| values.get(QUERY_REF).and_then(lenient_number))
        .map(|v| (v, ValueSource::LenientValues))
}

/// Threshold: `annotations.threshold`, then `annotations.__threshold__`,
/// then `labels.threshold`. An unparseable candidate is logged and skipped.
fn extract_threshold(alert: &RawAlert) -> Option<(f64, ThresholdSource)> {
    // ---
    let candidates = [
        (alert.annotations.get("threshold"), ThresholdSource::Annotation),
        (
            alert.annotations.get("__threshold__"),
            ThresholdSource::WrappedAnnotation,
        ),
        (alert.labels.get("threshold"), ThresholdSource::Label),
    ];

    candidates.into_iter().find_map(|(raw, source)| {
        let raw = raw?;
        let parsed = lenient_number(raw);
        if parsed.is_none() && !raw.is_null() {
            tracing::warn!(?source, "Could not parse threshold {}", raw);
        }
        parsed.map(|t| (t, source))
    })
}
