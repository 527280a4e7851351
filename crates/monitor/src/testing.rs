//! Test doubles for the monitors

use async_trait::async_trait;
use beacon_client::{
    EffectivenessRecord, EffectivenessSource, FetchError, StatusRecord, StatusSource,
    ValidatorIndex, ValidatorStatus,
};
use notifier::{Notifier, NotifyError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Source whose answers are set by the test before each cycle
#[derive(Default)]
pub struct ScriptedSource {
    statuses: Mutex<BTreeMap<ValidatorIndex, ValidatorStatus>>,
    effectiveness: Mutex<BTreeMap<ValidatorIndex, f64>>,
    /// Validators left out of the answer, as when their batch failed
    missing: Mutex<BTreeSet<ValidatorIndex>>,
    failing: Mutex<bool>,
}

impl ScriptedSource {
    pub fn set_status(&self, index: u64, label: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(ValidatorIndex(index), ValidatorStatus::from_label(label));
    }

    pub fn set_effectiveness(&self, index: u64, ratio: f64) {
        self.effectiveness.lock().unwrap().insert(ValidatorIndex(index), ratio);
    }

    pub fn set_missing(&self, index: u64, missing: bool) {
        let mut set = self.missing.lock().unwrap();
        if missing {
            set.insert(ValidatorIndex(index));
        } else {
            set.remove(&ValidatorIndex(index));
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn check_failing(&self) -> Result<(), FetchError> {
        if *self.failing.lock().unwrap() {
            return Err(FetchError::AllBatchesFailed {
                what: "scripted",
                batches: 1,
            });
        }
        Ok(())
    }

    fn answered(&self, validators: &[ValidatorIndex]) -> Vec<ValidatorIndex> {
        let missing = self.missing.lock().unwrap();
        validators
            .iter()
            .filter(|index| !missing.contains(*index))
            .copied()
            .collect()
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch_status(&self, validators: &[ValidatorIndex]) -> Result<Vec<StatusRecord>, FetchError> {
        self.check_failing()?;
        let statuses = self.statuses.lock().unwrap();
        Ok(self
            .answered(validators)
            .into_iter()
            .map(|index| StatusRecord {
                index,
                status: statuses.get(&index).cloned().unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl EffectivenessSource for ScriptedSource {
    async fn fetch_effectiveness(
        &self,
        validators: &[ValidatorIndex],
    ) -> Result<Vec<EffectivenessRecord>, FetchError> {
        self.check_failing()?;
        let effectiveness = self.effectiveness.lock().unwrap();
        Ok(self
            .answered(validators)
            .into_iter()
            .map(|index| EffectivenessRecord {
                index,
                effectiveness: effectiveness.get(&index).copied().unwrap_or(1.0),
            })
            .collect())
    }
}

/// Notifier that keeps every message, optionally failing delivery
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(NotifyError::Rejected("test".to_string()));
        }
        Ok(())
    }
}

/// Current-thread runtime with a paused clock, for async code run inside a metric capture
pub fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

pub fn indexes(values: &[u64]) -> Vec<ValidatorIndex> {
    values.iter().copied().map(ValidatorIndex).collect()
}
