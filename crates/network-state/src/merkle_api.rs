//! Reward Distribution API Client
//!
//! Fetches per-operator merkle records for socializing-pool cycles and keeps
//! the local cycle cache filled. The state builder never calls this; it only
//! reads the cache.

use crate::rewards::{closed_cycles, CycleCacheDir, CycleCacheError, RewardCycleRecord};
use alloy::primitives::Address;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors from the distribution API
#[derive(Debug, Error)]
pub enum RewardProofApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Distribution API returned {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error(transparent)]
    Cache(#[from] CycleCacheError),
}

/// HTTP client for the reward distribution service
#[derive(Debug, Clone)]
pub struct RewardProofApi {
    client: Client,
    base_url: String,
}

impl RewardProofApi {
    /// # Arguments
    /// * `base_url` - Service root, the `merklesForElRewards` routes hang off it
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RewardProofApiError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "Requesting merkle records");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RewardProofApiError::Status {
                status: response.status(),
                url,
            });
        }
        Ok(response.json().await?)
    }

    /// Record for one cycle and operator
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status or an undecodable body
    #[instrument(skip(self))]
    pub async fn get_cycle_proof(
        &self,
        cycle: u64,
        operator: Address,
    ) -> Result<RewardCycleRecord, RewardProofApiError> {
        self.get_json(&format!("/merklesForElRewards/{cycle}/{operator}"))
            .await
    }

    /// Every record published for an operator
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status or an undecodable body
    #[instrument(skip(self))]
    pub async fn get_all_proofs(
        &self,
        operator: Address,
    ) -> Result<Vec<RewardCycleRecord>, RewardProofApiError> {
        self.get_json(&format!("/merklesForElRewards/proofs/{operator}"))
            .await
    }

    /// Download every closed cycle missing from `cache`
    ///
    /// Records for the open cycle (`>= current_index`) are ignored. Returns the
    /// number of records written.
    ///
    /// # Errors
    /// Returns an error if the download fails or a record cannot be written
    #[instrument(skip(self, cache))]
    pub async fn sync_cycle_cache(
        &self,
        cache: &CycleCacheDir,
        operator: Address,
        current_index: u64,
    ) -> Result<usize, RewardProofApiError> {
        let closed = closed_cycles(current_index);
        if closed.clone().all(|cycle| cache.contains(cycle)) {
            debug!("Cycle cache already complete");
            return Ok(0);
        }

        let mut written = 0;
        for record in self.get_all_proofs(operator).await? {
            if closed.contains(&record.cycle) && cache.write_cycle(&record)? {
                written += 1;
            }
        }

        info!(written, current_index, "Cycle cache synced");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::RewardProofCache;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OPERATOR: &str = "0x1111111111111111111111111111111111111111";

    fn operator() -> Address {
        OPERATOR.parse().unwrap()
    }

    fn proofs_path() -> String {
        format!("/merklesForElRewards/proofs/{}", operator())
    }

    #[tokio::test]
    async fn test_get_cycle_proof() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/merklesForElRewards/3/{}", operator())))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cycle": 3,
                "eth": "1500000000000000000",
                "sd": "42",
                "proof": ["0xaa", "0xbb"]
            })))
            .mount(&server)
            .await;

        let api = RewardProofApi::new(server.uri());
        let record = api.get_cycle_proof(3, operator()).await.unwrap();

        assert_eq!(record.cycle, 3);
        assert_eq!(record.eth, "1500000000000000000");
        assert_eq!(record.proof.len(), 2);
    }

    #[tokio::test]
    async fn test_non_success_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = RewardProofApi::new(server.uri());
        let err = api.get_all_proofs(operator()).await.unwrap_err();

        assert!(matches!(err, RewardProofApiError::Status { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let api = RewardProofApi::new(server.uri());
        let err = api.get_cycle_proof(1, operator()).await.unwrap_err();

        assert!(matches!(err, RewardProofApiError::HttpError(_)));
    }

    #[tokio::test]
    async fn test_sync_writes_closed_cycles_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(proofs_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"cycle": 1, "eth": "10", "sd": "1", "proof": []},
                {"cycle": 2, "eth": "20", "sd": "2", "proof": []},
                {"cycle": 3, "eth": "30", "sd": "3", "proof": []}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = CycleCacheDir::open(dir.path()).unwrap();
        let api = RewardProofApi::new(server.uri());

        let written = api.sync_cycle_cache(&cache, operator(), 3).await.unwrap();

        assert_eq!(written, 2);
        assert!(cache.read_cycle(2).unwrap().is_some());
        assert!(cache.read_cycle(3).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_skips_request_when_complete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = CycleCacheDir::open(dir.path()).unwrap();
        cache
            .write_cycle(&RewardCycleRecord {
                cycle: 1,
                eth: "1".into(),
                sd: "1".into(),
                proof: vec![],
            })
            .unwrap();

        let api = RewardProofApi::new(server.uri());
        assert_eq!(api.sync_cycle_cache(&cache, operator(), 2).await.unwrap(), 0);
    }
}
