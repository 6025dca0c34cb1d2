//! Core data structures
//!
//! Account snapshot model and the normalization step that maps the
//! loosely-typed algod `account_info` payload into it.
//!
//! Created: 2026-10-19

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Opaque account identifier. Compared by exact string match, never validated here.
pub type Address = String;

/// Raw `account_info` payload exactly as returned by the node
pub type RawAccount = Value;

/// Normalized, fully-defaulted account state at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub amount: u64,
    pub pending_rewards: u64,
    pub status: String,
    pub total_apps_opted_in: u64,
    pub total_assets_opted_in: u64,
    pub min_balance: u64,
    pub rewards: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("account payload is not a JSON object")]
    NotAnObject,

    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{field}` has unexpected type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl AccountSnapshot {
    /// Field names in the order they are compared and reported
    pub const FIELDS: [&'static str; 7] = [
        "amount",
        "pending_rewards",
        "status",
        "total_apps_opted_in",
        "total_assets_opted_in",
        "min_balance",
        "rewards",
    ];

    /// Build a snapshot from a raw algod payload, applying defaults for
    /// every optional key. `amount` is the only required key.
    pub fn normalize(raw: &RawAccount) -> Result<Self, NormalizeError> {
        let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;

        let amount = match obj.get("amount") {
            Some(v) => as_u64(v, "amount")?,
            None => return Err(NormalizeError::MissingField("amount")),
        };

        Ok(Self {
            amount,
            pending_rewards: opt_u64(obj.get("pending-rewards"), "pending_rewards")?,
            status: opt_string(obj.get("status"), "status")?,
            total_apps_opted_in: opt_u64(obj.get("total-apps-opted-in"), "total_apps_opted_in")?,
            total_assets_opted_in: opt_u64(
                obj.get("total-assets-opted-in"),
                "total_assets_opted_in",
            )?,
            min_balance: opt_u64(obj.get("min-balance"), "min_balance")?,
            rewards: opt_u64(obj.get("rewards"), "rewards")?,
        })
    }

    /// Value of a named field, or None for an unknown name
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "amount" => FieldValue::Int(self.amount),
            "pending_rewards" => FieldValue::Int(self.pending_rewards),
            "status" => FieldValue::Text(self.status.clone()),
            "total_apps_opted_in" => FieldValue::Int(self.total_apps_opted_in),
            "total_assets_opted_in" => FieldValue::Int(self.total_assets_opted_in),
            "min_balance" => FieldValue::Int(self.min_balance),
            "rewards" => FieldValue::Int(self.rewards),
            _ => return None,
        };
        Some(value)
    }
}

fn as_u64(v: &Value, field: &'static str) -> Result<u64, NormalizeError> {
    v.as_u64().ok_or(NormalizeError::WrongType {
        field,
        expected: "unsigned integer",
    })
}

// JSON null is treated the same as an absent key
fn opt_u64(v: Option<&Value>, field: &'static str) -> Result<u64, NormalizeError> {
    match v {
        None | Some(Value::Null) => Ok(0),
        Some(v) => as_u64(v, field),
    }
}

fn opt_string(v: Option<&Value>, field: &'static str) -> Result<String, NormalizeError> {
    match v {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(NormalizeError::WrongType {
            field,
            expected: "string",
        }),
    }
}

/// A single snapshot field value, typed by its semantic kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(u64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Previous and current value of one changed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub previous: FieldValue,
    pub current: FieldValue,
}

/// Fields whose values differ between two snapshots of the same address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub changes: BTreeMap<&'static str, FieldChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }

    /// Changed field names, sorted
    pub fn fields(&self) -> Vec<&'static str> {
        self.changes.keys().copied().collect()
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self
            .changes
            .iter()
            .map(|(name, c)| format!("{}: {} -> {}", name, c.previous, c.current))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
