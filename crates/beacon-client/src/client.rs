//! Explorer REST Client
//!
//! Batches validator lookups, spaces batches out to stay below the
//! explorer's rate limits and retries transient failures with exponential
//! backoff. A failing batch is logged and skipped so one bad batch does not
//! throw away the rest of the poll.

use crate::api;
use crate::error::FetchError;
use crate::retry::RetryPolicy;
use crate::types::{
    self, EffectivenessRecord, StatusRecord, ValidatorIndex, ValidatorSelection,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default explorer
pub const DEFAULT_BASE_URL: &str = "https://gnosischa.in";

/// Default timeout for a single HTTP request
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Explorer base URL, without trailing slash
    pub base_url: String,
    /// Pause after each batch request
    pub batch_delay: Duration,
    /// Validators per request
    pub batch_size: usize,
    /// Timeout for a single HTTP request
    pub request_timeout: Duration,
    /// Retry policy for transient failures
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_delay: Duration::from_millis(200),
            batch_size: api::BATCH_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Explorer client
pub struct BeaconClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl BeaconClient {
    /// Create a new client
    pub fn new(mut config: ClientConfig) -> Result<Self, FetchError> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        config.batch_size = config.batch_size.max(1);
        info!("Creating explorer client for {}", config.base_url);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("validator-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| FetchError::Http {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(Self { http, config })
    }

    /// Explorer base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Resolve the monitored validators: union of every selector, deduplicated and sorted
    pub async fn resolve_validators(
        &self,
        selection: &ValidatorSelection,
    ) -> Result<Vec<ValidatorIndex>, FetchError> {
        let mut validators: BTreeSet<ValidatorIndex> =
            selection.indexes.iter().copied().map(ValidatorIndex).collect();

        if let Some(address) = &selection.eth1_withdraw_account {
            let by_address = self.validators_by_withdrawal_address(address).await?;
            info!("Found {} validators for withdrawal address {}", by_address.len(), address);
            validators.extend(by_address);
        }

        if !selection.public_keys.is_empty() {
            let by_keys = self.validators_by_public_keys(&selection.public_keys).await?;
            info!(
                "Found {} validators for {} public keys",
                by_keys.len(),
                selection.public_keys.len()
            );
            validators.extend(by_keys);
        }

        Ok(validators.into_iter().collect())
    }

    /// Validators withdrawing to an execution layer address
    pub async fn validators_by_withdrawal_address(
        &self,
        address: &str,
    ) -> Result<Vec<ValidatorIndex>, FetchError> {
        let url = format!("{}{}/validator/eth1/{}", self.config.base_url, api::V1, address);
        let body = self.get_json(&url).await?;
        types::parse_validator_indexes(&body).map_err(|reason| FetchError::Malformed { url, reason })
    }

    /// Validators for a list of public keys. Unlike polling, any failed batch fails the lookup.
    pub async fn validators_by_public_keys(
        &self,
        public_keys: &[String],
    ) -> Result<Vec<ValidatorIndex>, FetchError> {
        let mut validators = Vec::with_capacity(public_keys.len());
        for batch in public_keys.chunks(self.config.batch_size) {
            let url = format!("{}{}/validator/{}", self.config.base_url, api::V1, batch.join(","));
            let body = self.get_json(&url).await?;
            let indexes = types::parse_validator_indexes(&body)
                .map_err(|reason| FetchError::Malformed { url, reason })?;
            validators.extend(indexes);
        }
        Ok(validators)
    }

    /// Current status of the given validators
    pub async fn get_validators_status(
        &self,
        validators: &[ValidatorIndex],
    ) -> Result<Vec<StatusRecord>, FetchError> {
        let base_url = &self.config.base_url;
        self.fetch_batched(
            "status",
            validators,
            |param| format!("{}{}/validators?validators={}", base_url, api::DASHBOARD, param),
            types::parse_status,
        )
        .await
    }

    /// Attestation effectiveness of the given validators
    pub async fn get_validators_effectiveness(
        &self,
        validators: &[ValidatorIndex],
    ) -> Result<Vec<EffectivenessRecord>, FetchError> {
        let base_url = &self.config.base_url;
        self.fetch_batched(
            "effectiveness",
            validators,
            |param| format!("{}{}/validator/{}/attestationeffectiveness", base_url, api::V1, param),
            types::parse_effectiveness,
        )
        .await
    }

    async fn fetch_batched<T>(
        &self,
        what: &'static str,
        validators: &[ValidatorIndex],
        url_for: impl Fn(&str) -> String,
        parse: fn(&Value) -> Result<Vec<T>, String>,
    ) -> Result<Vec<T>, FetchError> {
        collect_batches(
            what,
            validators,
            self.config.batch_size,
            self.config.batch_delay,
            |batch| {
                let url = url_for(&join_indexes(batch));
                async move {
                    let body = self.get_json(&url).await?;
                    parse(&body).map_err(|reason| FetchError::Malformed { url, reason })
                }
            },
        )
        .await
    }

    /// GET a JSON document, retrying transient failures with exponential backoff
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            telemetry::record_http_request();

            match self.get_json_once(url).await {
                Ok(body) => {
                    telemetry::record_http_success();
                    return Ok(body);
                }
                Err(e) if e.is_transient() => {
                    if !self.config.retry.allows_retry(started.elapsed(), attempt) {
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = self.config.retry.delay_for(attempt);
                    warn!("GET {} failed (attempt {}): {}. Retrying in {:?}", url, attempt, e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_json_once(&self, url: &str) -> Result<Value, FetchError> {
        debug!("GET {}", url);
        let response = self.http.get(url).send().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Fetch every batch in turn, skipping the ones that fail. Only an empty
/// result caused by every batch failing is an error.
async fn collect_batches<'v, T, F, Fut>(
    what: &'static str,
    validators: &'v [ValidatorIndex],
    batch_size: usize,
    batch_delay: Duration,
    mut fetch_batch: F,
) -> Result<Vec<T>, FetchError>
where
    F: FnMut(&'v [ValidatorIndex]) -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
{
    let batches: Vec<&'v [ValidatorIndex]> = validators.chunks(batch_size.max(1)).collect();
    let mut records = Vec::with_capacity(validators.len());
    let mut failed = 0;

    for (position, &batch) in batches.iter().enumerate() {
        match fetch_batch(batch).await {
            Ok(batch_records) => records.extend(batch_records),
            Err(e) => {
                failed += 1;
                error!("Error getting validators {}: {}: {}", what, join_indexes(batch), e);
            }
        }

        // Space batches out to avoid rate limits
        if position + 1 < batches.len() && !batch_delay.is_zero() {
            tokio::time::sleep(batch_delay).await;
        }
    }

    if failed > 0 && failed == batches.len() {
        return Err(FetchError::AllBatchesFailed {
            what,
            batches: failed,
        });
    }

    Ok(records)
}

fn join_indexes(batch: &[ValidatorIndex]) -> String {
    batch
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
