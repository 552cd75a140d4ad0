//! In-memory backend used by unit tests.

use crate::auto_api::{AutoApiBackend, CallTracker};
use crate::errors::ApiError;
use crate::model::{
    AssetType, CreateTestCaseResultDto, CreateTestCaseResultResponseDto, SubmitTestCaseResultDto,
    TestResultProviderInfo, TestRunCreateDto, TestRunCreateResponseDto,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    StartRun(TestRunCreateDto),
    EndRun(u64),
    StartCase(CreateTestCaseResultDto),
    Submit(SubmitTestCaseResultDto),
    Links(Vec<u64>),
    Heartbeat(u64),
    Upload {
        result_id: u64,
        asset_name: String,
        provider_session_guid: String,
        asset_type: AssetType,
        len: usize,
    },
}

pub(crate) struct MockBackend {
    calls: Mutex<Vec<Call>>,
    run_id: u64,
    next_result_id: AtomicU64,
    heartbeat_failures: AtomicUsize,
    create_run_error: Option<ApiError>,
    create_case_error: Option<ApiError>,
    create_gate: Option<Semaphore>,
    case_gates: Option<Mutex<HashMap<String, Arc<Semaphore>>>>,
    links: Vec<TestResultProviderInfo>,
    tracker: CallTracker,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            run_id: 42,
            next_result_id: AtomicU64::new(100),
            heartbeat_failures: AtomicUsize::new(0),
            create_run_error: None,
            create_case_error: None,
            create_gate: None,
            case_gates: None,
            links: Vec::new(),
            tracker: CallTracker::default(),
        }
    }

    /// Hold every result creation until [`release_creations`](Self::release_creations) is called.
    pub(crate) fn with_gated_creation(mut self) -> Self {
        self.create_gate = Some(Semaphore::new(0));
        self
    }

    /// Hold each result creation until its test case name is released with
    /// [`release_case`](Self::release_case), so creations finish in any chosen order.
    pub(crate) fn with_gate_per_case(mut self) -> Self {
        self.case_gates = Some(Mutex::new(HashMap::new()));
        self
    }

    pub(crate) fn with_links(mut self, links: Vec<TestResultProviderInfo>) -> Self {
        self.links = links;
        self
    }

    pub(crate) fn failing_run_creation(mut self, err: ApiError) -> Self {
        self.create_run_error = Some(err);
        self
    }

    pub(crate) fn failing_case_creation(mut self, err: ApiError) -> Self {
        self.create_case_error = Some(err);
        self
    }

    /// Fail the next `n` heartbeats.
    pub(crate) fn failing_heartbeats(self, n: usize) -> Self {
        self.heartbeat_failures.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn release_creations(&self, n: usize) {
        if let Some(gate) = &self.create_gate {
            gate.add_permits(n);
        }
    }

    pub(crate) fn release_case(&self, test_case_name: &str) {
        if let Some(gate) = self.case_gate(test_case_name) {
            gate.add_permits(1);
        }
    }

    fn case_gate(&self, test_case_name: &str) -> Option<Arc<Semaphore>> {
        let gates = self.case_gates.as_ref()?;
        let mut gates = gates.lock().unwrap();
        Some(
            gates
                .entry(test_case_name.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(0)))
                .clone(),
        )
    }

    /// Names of created test cases, in the order their creation completed.
    pub(crate) fn created_cases(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::StartCase(dto) => Some(dto.test_case_name),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn heartbeats(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Heartbeat(_)))
            .count()
    }

    /// Calls other than heartbeats, which fire on their own schedule.
    pub(crate) fn reporting_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Heartbeat(_)))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AutoApiBackend for MockBackend {
    async fn start_test_run(
        &self,
        info: TestRunCreateDto,
    ) -> Result<TestRunCreateResponseDto, ApiError> {
        let _guard = self.tracker.acquire();
        self.record(Call::StartRun(info));
        match &self.create_run_error {
            Some(err) => Err(err.clone()),
            None => Ok(TestRunCreateResponseDto { run_id: self.run_id }),
        }
    }

    async fn end_test_run(&self, run_id: u64) -> Result<(), ApiError> {
        let _guard = self.tracker.acquire();
        self.record(Call::EndRun(run_id));
        Ok(())
    }

    async fn start_test_case(
        &self,
        params: CreateTestCaseResultDto,
    ) -> Result<CreateTestCaseResultResponseDto, ApiError> {
        let _guard = self.tracker.acquire();
        if let Some(gate) = &self.create_gate {
            gate.acquire().await.expect("gate is never closed").forget();
        }
        if let Some(gate) = self.case_gate(&params.test_case_name) {
            gate.acquire().await.expect("gate is never closed").forget();
        }
        self.record(Call::StartCase(params));
        if let Some(err) = &self.create_case_error {
            return Err(err.clone());
        }
        Ok(CreateTestCaseResultResponseDto {
            test_result_id: self.next_result_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn submit_test_case_result(
        &self,
        params: SubmitTestCaseResultDto,
    ) -> Result<(), ApiError> {
        let _guard = self.tracker.acquire();
        self.record(Call::Submit(params));
        Ok(())
    }

    async fn get_provider_session_links(
        &self,
        result_ids: &[u64],
    ) -> Result<Vec<TestResultProviderInfo>, ApiError> {
        let _guard = self.tracker.acquire();
        self.record(Call::Links(result_ids.to_vec()));
        Ok(self.links.clone())
    }

    async fn send_sdk_heartbeat(&self, run_id: u64) -> Result<(), ApiError> {
        let _guard = self.tracker.acquire();
        self.record(Call::Heartbeat(run_id));
        let failures = self.heartbeat_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.heartbeat_failures.store(failures - 1, Ordering::SeqCst);
            return Err(ApiError::Other("heartbeat rejected".into()));
        }
        Ok(())
    }

    async fn upload_asset(
        &self,
        result_id: u64,
        asset: Bytes,
        asset_name: &str,
        provider_session_guid: &str,
        asset_type: AssetType,
    ) -> Result<(), ApiError> {
        let _guard = self.tracker.acquire();
        self.record(Call::Upload {
            result_id,
            asset_name: asset_name.to_string(),
            provider_session_guid: provider_session_guid.to_string(),
            asset_type,
            len: asset.len(),
        });
        Ok(())
    }

    fn calls_in_flight(&self) -> usize {
        self.tracker.in_flight()
    }
}
