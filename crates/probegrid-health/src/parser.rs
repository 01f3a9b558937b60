//! Actuator-style health payload parser.
//!
//! Decodes `{"status": ..., "components": {...}, "details": {...}}` into a
//! [`HealthSnapshot`]. Maps are decoded into `BTreeMap`s so component order
//! and flattened detail strings are stable across runs.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use probegrid_core::{
    ComponentHealth, EXTENSIONS_COMPONENT, HealthSnapshot, HealthStatus, RollupCounts,
    SubComponent,
};

/// Errors from decoding a health payload.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty response body")]
    Empty,

    #[error("malformed health payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct WireHealth {
    status: String,
    components: Option<BTreeMap<String, WireComponent>>,
    details: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct WireComponent {
    status: Option<String>,
    details: Option<BTreeMap<String, Value>>,
    components: Option<BTreeMap<String, WireComponent>>,
}

impl WireComponent {
    fn status(&self) -> HealthStatus {
        self.status
            .as_deref()
            .map(HealthStatus::from)
            .unwrap_or(HealthStatus::Unknown)
    }
}

/// Parse a raw response body into a snapshot.
///
/// Rollup counts cover top-level components only; sub-components of
/// `extensions` are listed but never counted.
pub fn parse(raw: Bytes) -> Result<HealthSnapshot, ParseError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }

    let wire: WireHealth = serde_json::from_slice(&raw)?;

    let mut counts = RollupCounts::default();
    let mut components = Vec::new();

    for (name, component) in wire.components.unwrap_or_default() {
        let status = component.status();
        counts.record(&status);

        let nested = component.components.unwrap_or_default();
        let (details, sub_components) = if name == EXTENSIONS_COMPONENT {
            let subs = nested
                .into_iter()
                .map(|(sub_name, sub)| SubComponent {
                    status: sub.status(),
                    details: flatten(sub.details.as_ref(), sub.components.as_ref()),
                    name: sub_name,
                })
                .collect();
            (flatten(component.details.as_ref(), None), subs)
        } else {
            (
                flatten(component.details.as_ref(), Some(&nested)),
                Vec::new(),
            )
        };

        components.push(ComponentHealth {
            name,
            status,
            details,
            sub_components,
        });
    }

    Ok(HealthSnapshot {
        status: HealthStatus::from(wire.status),
        components,
        details: flatten(wire.details.as_ref(), None),
        counts,
        raw,
    })
}

/// Render details as `key=value, key=value`, followed by `name=STATUS` for
/// each nested component.
fn flatten(
    details: Option<&BTreeMap<String, Value>>,
    nested: Option<&BTreeMap<String, WireComponent>>,
) -> String {
    let mut parts = Vec::new();

    for (key, value) in details.into_iter().flatten() {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        parts.push(format!("{key}={rendered}"));
    }

    for (name, component) in nested.into_iter().flatten() {
        parts.push(format!("{name}={}", component.status()));
    }

    parts.join(", ")
}
