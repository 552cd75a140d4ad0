//! Run-level reporting.
//!
//! [`RunReporter`] correlates caller-chosen local ids with server-assigned
//! result ids. Every backend call is spawned immediately, so callers may fire
//! and forget; the returned [`PendingResult`] can be awaited by any number of
//! parties. [`RunInitializer`] creates the run and its heartbeat.

use crate::auto_api::AutoApiBackend;
use crate::errors::{ApiError, ReporterError};
use crate::heartbeat::{HeartbeatErrorObserver, TestRunHeartbeatService, DEFAULT_HEARTBEAT_INTERVAL};
use crate::model::{
    AdditionalTestCaseParams, AdditionalTestCaseResultParams, AssetType, CreateTestCaseResultDto,
    SubmitTestCaseResultDto, TestResultProviderInfo, TestResultStatus, TestRunCreateDto,
};
use crate::test_case_name::parse_test_case_name;
use bytes::Bytes;
use futures::future::{try_join_all, BoxFuture, Shared};
use futures::{FutureExt, TryFutureExt};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{error, info, warn};

/// File the provider session links are written to at the end of a run.
pub const PROVIDER_URLS_FILE: &str = "providerUrls.txt";

type SharedResult = Shared<BoxFuture<'static, Result<u64, ReporterError>>>;

/// A result id that resolves once its backend call completes.
///
/// The underlying call runs whether or not this handle is awaited.
#[derive(Clone)]
pub struct PendingResult {
    inner: SharedResult,
}

impl PendingResult {
    fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = Result<u64, ReporterError>> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let inner = handle
            .unwrap_or_else(|e| Err(ReporterError::TaskFailed(e.to_string())))
            .boxed()
            .shared();
        Self { inner }
    }
}

impl Future for PendingResult {
    type Output = Result<u64, ReporterError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for PendingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResult")
            .field("resolved", &self.inner.peek().is_some())
            .finish()
    }
}

/// Knobs shared by the run initializer and the lifecycle controller.
#[derive(Clone)]
pub struct ReporterOptions {
    /// Attach to an existing run instead of creating one.
    pub resume: Option<super::RunResumeToken>,
    pub heartbeat_interval: Duration,
    pub heartbeat_observer: Option<HeartbeatErrorObserver>,
    /// Directory that receives [`PROVIDER_URLS_FILE`].
    pub output_dir: PathBuf,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            resume: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_observer: None,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Creates test runs and hands back a [`RunReporter`] with its heartbeat running.
pub struct RunInitializer {
    api: Arc<dyn AutoApiBackend>,
    options: ReporterOptions,
}

impl RunInitializer {
    pub fn new(api: Arc<dyn AutoApiBackend>, options: ReporterOptions) -> Self {
        Self { api, options }
    }

    pub async fn initialize_run(
        &self,
        tests: Option<Vec<String>>,
    ) -> Result<RunReporter, ReporterError> {
        let cleaned = tests
            .unwrap_or_default()
            .iter()
            .map(|name| parse_test_case_name(name).test_case_name)
            .collect();

        let created = match self
            .api
            .start_test_run(TestRunCreateDto {
                tests: cleaned,
                itw_test_cycle_id: None,
            })
            .await
        {
            Ok(created) => created,
            Err(ApiError::Status { status, .. }) => {
                error!(
                    "Failed to create Applause Test Run: received error response with status {status}."
                );
                return Err(ReporterError::RunCreationFailed { status });
            }
            Err(e) => return Err(e.into()),
        };
        let run_id = created.run_id;
        info!("Test Run {run_id} initialized");

        let mut heartbeat = TestRunHeartbeatService::new(run_id, self.api.clone())
            .with_interval(self.options.heartbeat_interval);
        if let Some(observer) = &self.options.heartbeat_observer {
            heartbeat = heartbeat.with_error_observer(observer.clone());
        }
        heartbeat.start().await;

        Ok(RunReporter::new(
            self.api.clone(),
            run_id,
            Some(heartbeat),
            self.options.output_dir.clone(),
        ))
    }
}

/// Reports test case results for a single run.
pub struct RunReporter {
    api: Arc<dyn AutoApiBackend>,
    test_run_id: u64,
    heartbeat: Option<TestRunHeartbeatService>,
    uid_to_result_id: Mutex<IndexMap<String, SharedResult>>,
    result_submissions: Mutex<IndexMap<String, SharedResult>>,
    output_dir: PathBuf,
}

impl RunReporter {
    pub fn new(
        api: Arc<dyn AutoApiBackend>,
        test_run_id: u64,
        heartbeat: Option<TestRunHeartbeatService>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            api,
            test_run_id,
            heartbeat,
            uid_to_result_id: Mutex::new(IndexMap::new()),
            result_submissions: Mutex::new(IndexMap::new()),
            output_dir,
        }
    }

    pub fn test_run_id(&self) -> u64 {
        self.test_run_id
    }

    /// Create a result for `test_case_name`, recorded under the local `id`.
    ///
    /// Ids embedded in the name are sent along unless `params` sets them. A
    /// repeated `id` replaces the earlier pending result.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_test_case(
        &self,
        id: &str,
        test_case_name: &str,
        params: Option<AdditionalTestCaseParams>,
    ) -> Result<PendingResult, ReporterError> {
        if test_case_name.is_empty() {
            error!("testCaseName is required");
            return Err(ReporterError::EmptyTestCaseName);
        }
        let parsed = parse_test_case_name(test_case_name);
        let params = params.unwrap_or_default();
        let request = CreateTestCaseResultDto {
            test_run_id: self.test_run_id,
            test_case_name: parsed.test_case_name,
            provider_session_ids: params.provider_session_ids,
            test_case_id: params.test_case_id.or(parsed.test_rail_test_case_id),
            itw_test_case_id: params.itw_test_case_id.or(parsed.applause_test_case_id),
        };

        let api = self.api.clone();
        let pending = PendingResult::spawn(async move {
            let created = api.start_test_case(request).await?;
            Ok(created.test_result_id)
        });
        lock(&self.uid_to_result_id).insert(id.to_string(), pending.inner.clone());
        Ok(pending)
    }

    /// Submit the final status for the test case started under `id`.
    ///
    /// The submission waits for the result to be created first. Returns `None`
    /// when no test case was started under `id`; nothing is sent in that case.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_test_case_result(
        &self,
        id: &str,
        status: TestResultStatus,
        params: Option<AdditionalTestCaseResultParams>,
    ) -> Option<PendingResult> {
        let Some(creation) = lock(&self.uid_to_result_id).get(id).cloned() else {
            warn!("No test case was started for id `{id}`, skipping result submission");
            return None;
        };

        let api = self.api.clone();
        let pending = PendingResult::spawn(async move {
            let test_result_id = creation.await?;
            api.submit_test_case_result(SubmitTestCaseResultDto {
                test_result_id,
                status,
                params: params.unwrap_or_default(),
            })
            .await?;
            Ok(test_result_id)
        });
        lock(&self.result_submissions).insert(id.to_string(), pending.inner.clone());
        Some(pending)
    }

    /// Upload an asset for the test case started under `id`, once its result exists.
    pub async fn attach_test_case_asset(
        &self,
        id: &str,
        asset_name: &str,
        provider_session_guid: &str,
        asset_type: AssetType,
        asset: Bytes,
    ) -> Result<(), ReporterError> {
        let Some(creation) = lock(&self.uid_to_result_id).get(id).cloned() else {
            warn!("No test case was started for id `{id}`, skipping asset `{asset_name}`");
            return Ok(());
        };
        let result_id = creation.await?;
        self.api
            .upload_asset(result_id, asset, asset_name, provider_session_guid, asset_type)
            .await?;
        Ok(())
    }

    /// Drain all pending work, stop the heartbeat, end the run, and save provider links.
    ///
    /// Only test cases started before this call are waited on.
    pub async fn runner_end(&self) -> Result<(), ReporterError> {
        let creations: Vec<SharedResult> = lock(&self.uid_to_result_id).values().cloned().collect();
        let result_ids = try_join_all(creations).await?;

        let submissions: Vec<SharedResult> =
            lock(&self.result_submissions).values().cloned().collect();
        try_join_all(submissions).await?;

        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.end().await;
        }
        self.api.end_test_run(self.test_run_id).await?;

        let valid_ids: Vec<u64> = result_ids.into_iter().filter(|id| *id != 0).collect();
        let links = self.api.get_provider_session_links(&valid_ids).await?;
        if !links.is_empty() {
            info!("{}", serde_json::to_string(&links).unwrap_or_default());
            write_provider_links(&self.output_dir, &links).await?;
        }
        Ok(())
    }
}

/// Write `links` as JSON indented by a single space, the layout CI tooling expects.
pub async fn write_provider_links(
    dir: &Path,
    links: &[TestResultProviderInfo],
) -> Result<PathBuf, ReporterError> {
    let path = dir.join(PROVIDER_URLS_FILE);
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    links
        .serialize(&mut ser)
        .map_err(|e| ReporterError::WriteProviderLinks {
            path: path.clone(),
            err: Arc::new(e.into()),
        })?;
    tokio::fs::write(&path, out)
        .await
        .map_err(|e| ReporterError::WriteProviderLinks {
            path: path.clone(),
            err: Arc::new(e),
        })?;
    Ok(path)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // The maps are only ever inserted into; a poisoned guard still holds valid entries.
    m.lock().unwrap_or_else(|e| e.into_inner())
}
