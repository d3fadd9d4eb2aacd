//! circuit witness input map
//!
//! the external witness calculator takes a json map keyed by signal name,
//! every field value a decimal string. internally everything stays as 32-byte
//! field elements; decimal only appears here, at the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use umbriel_crypto::FieldElement;

/// membership proof in the circuit's signal shape
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipSignal {
    pub leaf: String,
    pub blinding: String,
    pub path_indices: String,
    pub path_elements: Vec<String>,
}

/// non-membership proof in the circuit's signal shape
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NonMembershipSignal {
    pub key: String,
    pub old_key: String,
    pub old_value: String,
    pub is_old0: String,
    pub siblings: Vec<String>,
}

/// ordered signal map for the witness calculator
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct CircuitInputs {
    signals: BTreeMap<String, Value>,
}

impl CircuitInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// single field signal
    pub fn set_field(&mut self, name: &str, value: FieldElement) {
        self.signals
            .insert(name.into(), Value::String(value.to_decimal()));
    }

    /// flat array signal
    pub fn set_fields(&mut self, name: &str, values: &[FieldElement]) {
        let arr = values
            .iter()
            .map(|v| Value::String(v.to_decimal()))
            .collect();
        self.signals.insert(name.into(), Value::Array(arr));
    }

    /// two-dimensional array signal
    pub fn set_matrix(&mut self, name: &str, rows: &[Vec<FieldElement>]) {
        let arr = rows
            .iter()
            .map(|row| {
                Value::Array(
                    row.iter()
                        .map(|v| Value::String(v.to_decimal()))
                        .collect(),
                )
            })
            .collect();
        self.signals.insert(name.into(), Value::Array(arr));
    }

    /// arbitrary pre-shaped signal (proof structs, nested arrays)
    pub fn set_value(&mut self, name: &str, value: Value) {
        self.signals.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.signals.get(name)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// the json the witness calculator consumes
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.signals).expect("string/array map serializes")
    }
}
