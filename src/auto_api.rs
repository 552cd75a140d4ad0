//! Client for the Applause Automation API.
//!
//! [`AutoApiBackend`] is the contract the reporter depends on. [`AutoApi`] is
//! the HTTP implementation. Every call holds an [`InFlightGuard`] for its whole
//! duration so callers can tell when all outstanding work has drained.

use crate::config::AutoApiConfig;
use crate::errors::{ApiError, ConfigError};
use crate::model::{
    AssetType, CreateTestCaseResultDto, CreateTestCaseResultResponseDto, SubmitTestCaseResultDto,
    TestResultProviderInfo, TestRunCreateDto, TestRunCreateResponseDto,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::error;

/// Version string reported to the backend on run creation.
pub const SDK_VERSION: &str = concat!("rust:", env!("CARGO_PKG_VERSION"));

/// Operations the reporter needs from the Applause backend.
#[async_trait]
pub trait AutoApiBackend: Send + Sync {
    async fn start_test_run(
        &self,
        info: TestRunCreateDto,
    ) -> Result<TestRunCreateResponseDto, ApiError>;

    /// Mark a run complete.
    async fn end_test_run(&self, run_id: u64) -> Result<(), ApiError>;

    async fn start_test_case(
        &self,
        params: CreateTestCaseResultDto,
    ) -> Result<CreateTestCaseResultResponseDto, ApiError>;

    async fn submit_test_case_result(&self, params: SubmitTestCaseResultDto)
        -> Result<(), ApiError>;

    /// Provider session links for the given result ids. Callers drop zero ids first.
    async fn get_provider_session_links(
        &self,
        result_ids: &[u64],
    ) -> Result<Vec<TestResultProviderInfo>, ApiError>;

    async fn send_sdk_heartbeat(&self, run_id: u64) -> Result<(), ApiError>;

    async fn upload_asset(
        &self,
        result_id: u64,
        asset: Bytes,
        asset_name: &str,
        provider_session_guid: &str,
        asset_type: AssetType,
    ) -> Result<(), ApiError>;

    /// Number of backend calls currently outstanding.
    fn calls_in_flight(&self) -> usize;
}

/// Shared counter of outstanding calls.
#[derive(Clone, Debug, Default)]
pub struct CallTracker {
    in_flight: Arc<AtomicUsize>,
}

impl CallTracker {
    /// Count a call as in flight until the returned guard is dropped.
    pub fn acquire(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Releases its slot in the [`CallTracker`] on drop, including on error and cancellation.
#[must_use = "the call is only counted while the guard is alive"]
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Body of the run creation request: caller-provided fields plus product settings.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TestRunCreateRequest<'a> {
    tests: &'a [String],
    sdk_version: &'static str,
    product_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    itw_test_cycle_id: Option<u64>,
    test_rail_reporting_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    add_all_tests_to_plan: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_rail_project_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_rail_suite_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_rail_plan_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_rail_run_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    override_test_rail_run_name_uniqueness: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatRequest {
    test_run_id: u64,
}

/// HTTP client for the Automation API.
pub struct AutoApi {
    http: reqwest::Client,
    base_url: Url,
    config: AutoApiConfig,
    calls: CallTracker,
}

impl AutoApi {
    /// Validate `config` and build the HTTP client.
    pub fn new(config: AutoApiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let base_url = parse_base_url("autoApiBaseUrl", &config.auto_api_base_url)?;
        let http = build_http_client(&config.api_key, config.timeout)?;
        Ok(Self {
            http,
            base_url,
            config,
            calls: CallTracker::default(),
        })
    }

    pub fn config(&self) -> &AutoApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url.join(path).map_err(|e| ApiError::InvalidUrl {
            url: format!("{}{}", self.base_url, path),
            reason: e.to_string(),
        })
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let resp = send(path, self.http.post(self.url(path)?).json(body)).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::request(path, e))
    }

    async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        send(path, self.http.post(self.url(path)?).json(body)).await?;
        Ok(())
    }
}

#[async_trait]
impl AutoApiBackend for AutoApi {
    async fn start_test_run(
        &self,
        info: TestRunCreateDto,
    ) -> Result<TestRunCreateResponseDto, ApiError> {
        let _guard = self.calls.acquire();
        let test_rail = self.config.test_rail_options.as_ref();
        let body = TestRunCreateRequest {
            tests: &info.tests,
            sdk_version: SDK_VERSION,
            product_id: self.config.product_id,
            itw_test_cycle_id: info
                .itw_test_cycle_id
                .or(self.config.applause_test_cycle_id),
            test_rail_reporting_enabled: test_rail.is_some(),
            add_all_tests_to_plan: test_rail.and_then(|t| t.add_all_tests_to_plan),
            test_rail_project_id: test_rail.map(|t| t.project_id),
            test_rail_suite_id: test_rail.map(|t| t.suite_id),
            test_rail_plan_name: test_rail.map(|t| t.plan_name.as_str()),
            test_rail_run_name: test_rail.map(|t| t.run_name.as_str()),
            override_test_rail_run_name_uniqueness: test_rail
                .and_then(|t| t.override_test_rail_run_uniqueness),
        };
        self.post_json("api/v1.0/test-run/create", &body).await
    }

    async fn end_test_run(&self, run_id: u64) -> Result<(), ApiError> {
        let _guard = self.calls.acquire();
        let path = format!("api/v1.0/test-run/{run_id}?endingStatus=COMPLETE");
        send(&path, self.http.delete(self.url(&path)?)).await?;
        Ok(())
    }

    async fn start_test_case(
        &self,
        params: CreateTestCaseResultDto,
    ) -> Result<CreateTestCaseResultResponseDto, ApiError> {
        let _guard = self.calls.acquire();
        self.post_json("api/v1.0/test-result/create-result", &params)
            .await
    }

    async fn submit_test_case_result(
        &self,
        params: SubmitTestCaseResultDto,
    ) -> Result<(), ApiError> {
        let _guard = self.calls.acquire();
        self.post_empty("api/v1.0/test-result", &params).await
    }

    async fn get_provider_session_links(
        &self,
        result_ids: &[u64],
    ) -> Result<Vec<TestResultProviderInfo>, ApiError> {
        let _guard = self.calls.acquire();
        self.post_json("api/v1.0/test-result/provider-info", result_ids)
            .await
    }

    async fn send_sdk_heartbeat(&self, run_id: u64) -> Result<(), ApiError> {
        let _guard = self.calls.acquire();
        self.post_empty(
            "api/v2.0/sdk-heartbeat",
            &HeartbeatRequest {
                test_run_id: run_id,
            },
        )
        .await
    }

    async fn upload_asset(
        &self,
        result_id: u64,
        asset: Bytes,
        asset_name: &str,
        provider_session_guid: &str,
        asset_type: AssetType,
    ) -> Result<(), ApiError> {
        let _guard = self.calls.acquire();
        let path = format!("api/v1.0/test-result/{result_id}/upload");
        let len = asset.len() as u64;
        let file = reqwest::multipart::Part::stream_with_length(asset, len)
            .file_name(asset_name.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("assetName", asset_name.to_string())
            .text("providerSessionGuid", provider_session_guid.to_string())
            .text("assetType", asset_type.as_str());
        send(&path, self.http.post(self.url(&path)?).multipart(form)).await?;
        Ok(())
    }

    fn calls_in_flight(&self) -> usize {
        self.calls.in_flight()
    }
}

/// Send a request and turn non-success statuses into [`ApiError::Status`].
pub(crate) async fn send(endpoint: &str, req: RequestBuilder) -> Result<Response, ApiError> {
    let resp = req
        .send()
        .await
        .map_err(|e| ApiError::request(endpoint, e))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body = if body.is_empty() {
        status.canonical_reason().unwrap_or_default().to_string()
    } else {
        body
    };
    error!("Applause API returned error-code [{}] with error [{}]", status.as_u16(), body);
    Err(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Parse a base URL, making sure relative endpoint paths join under it.
pub(crate) fn parse_base_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|_| ConfigError::InvalidUrl {
        field,
        url: raw.to_string(),
    })
}

pub(crate) fn build_http_client(
    api_key: &str,
    timeout: std::time::Duration,
) -> Result<reqwest::Client, ConfigError> {
    let mut headers = HeaderMap::new();
    let mut key = HeaderValue::from_str(api_key).map_err(|_| ConfigError::InvalidApiKey)?;
    key.set_sensitive(true);
    headers.insert("X-Api-Key", key);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(ConfigError::HttpClient)
}

#[cfg(test)]
pub(crate) mod test_server {
    //! A single-shot HTTP/1.1 server for exercising the real clients.

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one request with the given status and body; the handle yields the raw request.
    pub(crate) async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (format!("http://{addr}/"), handle)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        buf.len() >= header_end + 4 + content_length
    }
}
