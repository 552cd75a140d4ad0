//! Client for the Applause Public API, used to submit results against test
//! cycle cases outside of an automation run.

use crate::auto_api::{build_http_client, parse_base_url, send, CallTracker};
use crate::config::{PublicApiConfig, PUBLIC_API_TIMEOUT};
use crate::errors::{ApiError, ConfigError};
use crate::model::TestRunAutoResultDto;
use reqwest::Url;

pub struct PublicApi {
    http: reqwest::Client,
    base_url: Url,
    calls: CallTracker,
}

impl PublicApi {
    pub fn new(config: &PublicApiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            http: build_http_client(&config.api_key, PUBLIC_API_TIMEOUT)?,
            base_url: parse_base_url("publicApiBaseUrl", &config.public_api_base_url)?,
            calls: CallTracker::default(),
        })
    }

    /// Number of calls currently outstanding.
    pub fn calls_in_flight(&self) -> usize {
        self.calls.in_flight()
    }

    pub async fn submit_result(
        &self,
        test_case_id: u64,
        info: &TestRunAutoResultDto,
    ) -> Result<(), ApiError> {
        let _guard = self.calls.acquire();
        let path = format!("v2/test-case-results/{test_case_id}/submit");
        let url = self.base_url.join(&path).map_err(|e| ApiError::InvalidUrl {
            url: format!("{}{}", self.base_url, path),
            reason: e.to_string(),
        })?;
        send(&path, self.http.post(url).json(info)).await?;
        Ok(())
    }
}
