//! Validator data types and response parsing

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Raw status label reported for a healthy validator
const ACTIVE_ONLINE: &str = "active_online";
/// Raw status label reported for a validator missing attestations
const ACTIVE_OFFLINE: &str = "active_offline";

/// Index of a validator in the beacon chain registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatorIndex(pub u64);

impl ValidatorIndex {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ValidatorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validator status as reported by the explorer
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ValidatorStatus {
    #[default]
    ActiveOnline,
    ActiveOffline,
    /// Any other label (pending, exiting, slashed...), kept verbatim
    Other(String),
}

impl ValidatorStatus {
    /// Parse a raw explorer label
    pub fn from_label(label: &str) -> Self {
        match label {
            ACTIVE_ONLINE => Self::ActiveOnline,
            ACTIVE_OFFLINE => Self::ActiveOffline,
            other => Self::Other(other.to_string()),
        }
    }

    /// Raw explorer label
    pub fn as_label(&self) -> &str {
        match self {
            Self::ActiveOnline => ACTIVE_ONLINE,
            Self::ActiveOffline => ACTIVE_OFFLINE,
            Self::Other(label) => label,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::ActiveOnline)
    }
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Status of one validator in one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub index: ValidatorIndex,
    pub status: ValidatorStatus,
}

/// Attestation effectiveness of one validator in one poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectivenessRecord {
    pub index: ValidatorIndex,
    /// Ratio, nominally between 0 and 1
    pub effectiveness: f64,
}

/// Which validators to monitor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSelection {
    /// All validators withdrawing to this execution layer address
    pub eth1_withdraw_account: Option<String>,
    /// Validator public keys (hex)
    pub public_keys: Vec<String>,
    /// Explicit validator indexes
    pub indexes: Vec<u64>,
}

impl ValidatorSelection {
    pub fn is_empty(&self) -> bool {
        self.eth1_withdraw_account.is_none() && self.public_keys.is_empty() && self.indexes.is_empty()
    }
}

/// Explorer deep link for a validator
pub fn validator_url(base_url: &str, index: ValidatorIndex) -> String {
    format!("{}/validator/{}", base_url.trim_end_matches('/'), index)
}

/// The `data` property as a list. Single results may come back as a bare object.
fn data_items(body: &Value) -> Result<Vec<&Value>, String> {
    match body.get("data") {
        Some(Value::Array(items)) => Ok(items.iter().collect()),
        Some(item @ Value::Object(_)) => Ok(vec![item]),
        Some(other) => Err(format!("expected an array for \"data\", got {}", other)),
        None => Err("missing \"data\" property".to_string()),
    }
}

fn index_of(value: &Value) -> Option<ValidatorIndex> {
    match value {
        Value::Number(n) => n.as_u64().map(ValidatorIndex),
        Value::String(s) => s.parse().ok().map(ValidatorIndex),
        _ => None,
    }
}

/// Parse `data[].validatorindex` (address and public key lookups)
pub(crate) fn parse_validator_indexes(body: &Value) -> Result<Vec<ValidatorIndex>, String> {
    data_items(body)?
        .into_iter()
        .map(|item| {
            item.get("validatorindex")
                .and_then(index_of)
                .ok_or_else(|| format!("item without a valid \"validatorindex\": {}", item))
        })
        .collect()
}

/// Parse the dashboard rows: index at position 1, status label at position 3
pub(crate) fn parse_status(body: &Value) -> Result<Vec<StatusRecord>, String> {
    data_items(body)?
        .into_iter()
        .map(|row| {
            let index = row.get(1).and_then(index_of);
            let status = row.get(3).and_then(Value::as_str);
            match (index, status) {
                (Some(index), Some(label)) => Ok(StatusRecord {
                    index,
                    status: ValidatorStatus::from_label(label),
                }),
                _ => Err(format!("unexpected status row: {}", row)),
            }
        })
        .collect()
}

/// Parse `data[].{validatorindex, attestation_efficiency}`
pub(crate) fn parse_effectiveness(body: &Value) -> Result<Vec<EffectivenessRecord>, String> {
    data_items(body)?
        .into_iter()
        .map(|item| {
            let index = item.get("validatorindex").and_then(index_of);
            let effectiveness = item.get("attestation_efficiency").and_then(Value::as_f64);
            match (index, effectiveness) {
                (Some(index), Some(effectiveness)) => Ok(EffectivenessRecord {
                    index,
                    effectiveness,
                }),
                _ => Err(format!("unexpected effectiveness item: {}", item)),
            }
        })
        .collect()
}
