//! Response shaping: the canonical success/error envelopes returned by every endpoint operation
//! and the deep merge used to combine live records with mock records.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fault::catalog::FaultDescriptor;

/// Marker appended to the body of every synthesized error
pub const GENERATED_BY: &str = " -- generated by mockend";

/// Envelope returned when an operation succeeds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEnvelope {
    pub status_code: u16,
    pub status_text: String,
    pub data: Value,
}

/// Envelope carried by [`crate::error::Error::Rejected`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub status_text: String,
    pub body: Value,
}

/// 200 OK wrapping `data`
pub fn success(data: Value) -> SuccessEnvelope {
    SuccessEnvelope {
        status_code: 200,
        status_text: "OK".to_string(),
        data,
    }
}

/// 201 Created with empty data, returned after a successful create
pub fn created() -> SuccessEnvelope {
    SuccessEnvelope {
        status_code: 201,
        status_text: "Created".to_string(),
        data: Value::Null,
    }
}

impl From<&FaultDescriptor> for ErrorEnvelope {
    fn from(fault: &FaultDescriptor) -> Self {
        Self {
            status_code: fault.status_code,
            status_text: fault.status_text.to_string(),
            body: Value::String(format!("{}{}", fault.status_text, GENERATED_BY)),
        }
    }
}

/// Which side wins when both records define the same key
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Values coming from the live origin win
    #[default]
    Remote,
    /// Values coming from the mock record win
    Fixture,
}

/// Deep merges `remote` and `fixture`.
///
/// The winning side (given by `priority`) overwrites the other one key by key. Nested objects are
/// merged recursively, everything else (scalars and arrays) is replaced wholesale.
/// Neither input is touched, the merged value is a fresh copy.
pub fn merge_fixture(remote: &Value, fixture: &Value, priority: Priority) -> Value {
    match priority {
        Priority::Fixture => deep_merge(remote, fixture),
        Priority::Remote => deep_merge(fixture, remote),
    }
}

fn deep_merge(base: &Value, winner: &Value) -> Value {
    match (base, winner) {
        (Value::Object(base), Value::Object(winner)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (key, value) in winner {
                let entry = match (merged.get(key), value) {
                    (Some(existing), Value::Object(_)) => deep_merge(existing, value),
                    _ => value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        (_, winner) => winner.clone(),
    }
}
