//! Data source seams consumed by the monitors

use crate::client::BeaconClient;
use crate::error::FetchError;
use crate::types::{EffectivenessRecord, StatusRecord, ValidatorIndex};
use async_trait::async_trait;

/// Something that reports the current status of validators
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, validators: &[ValidatorIndex]) -> Result<Vec<StatusRecord>, FetchError>;
}

/// Something that reports the current effectiveness of validators
#[async_trait]
pub trait EffectivenessSource: Send + Sync {
    async fn fetch_effectiveness(
        &self,
        validators: &[ValidatorIndex],
    ) -> Result<Vec<EffectivenessRecord>, FetchError>;
}

#[async_trait]
impl StatusSource for BeaconClient {
    async fn fetch_status(&self, validators: &[ValidatorIndex]) -> Result<Vec<StatusRecord>, FetchError> {
        self.get_validators_status(validators).await
    }
}

#[async_trait]
impl EffectivenessSource for BeaconClient {
    async fn fetch_effectiveness(
        &self,
        validators: &[ValidatorIndex],
    ) -> Result<Vec<EffectivenessRecord>, FetchError> {
        self.get_validators_effectiveness(validators).await
    }
}
