//! Run lifecycle controller.
//!
//! [`ApplauseReporter`] is the entry point test frameworks talk to. It guards
//! the run lifecycle (start once, report, end once) and delegates the actual
//! reporting to a [`RunReporter`].

use super::reporter::{PendingResult, ReporterOptions, RunInitializer, RunReporter};
use crate::auto_api::{AutoApi, AutoApiBackend};
use crate::config::AutoApiConfig;
use crate::errors::{ConfigError, Operation, ReporterError};
use crate::model::{
    AdditionalTestCaseParams, AdditionalTestCaseResultParams, AssetType, TestResultStatus,
};
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Environment variable holding the id of a run created by another process.
pub const RUN_ID_ENV: &str = "APPLAUSE_RUN_ID";

/// Identifies an already-created run to report into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResumeToken {
    run_id: u64,
}

impl RunResumeToken {
    pub fn new(run_id: u64) -> Self {
        Self { run_id }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Read the run id from [`RUN_ID_ENV`]. Unset or unparsable values yield `None`.
    pub fn from_env() -> Option<Self> {
        let raw = std::env::var(RUN_ID_ENV).ok()?;
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<u64>() {
            Ok(run_id) => Some(Self::new(run_id)),
            Err(e) => {
                warn!("ignoring {RUN_ID_ENV}={raw:?}: {e}");
                None
            }
        }
    }
}

/// How the reporter reaches the Auto API.
pub enum Connection {
    Config(AutoApiConfig),
    Client(Arc<dyn AutoApiBackend>),
}

enum RunState {
    NotStarted,
    Starting,
    Started(Arc<RunReporter>),
    Ended,
}

pub struct ApplauseReporter {
    api: Arc<dyn AutoApiBackend>,
    initializer: RunInitializer,
    state: Mutex<RunState>,
}

impl ApplauseReporter {
    pub fn new(connection: Connection, options: ReporterOptions) -> Result<Self, ConfigError> {
        let api: Arc<dyn AutoApiBackend> = match connection {
            Connection::Config(config) => Arc::new(AutoApi::new(config)?),
            Connection::Client(api) => api,
        };
        let state = match options.resume {
            Some(token) => {
                info!("Reporting into existing Test Run {}", token.run_id());
                RunState::Started(Arc::new(RunReporter::new(
                    api.clone(),
                    token.run_id(),
                    None,
                    options.output_dir.clone(),
                )))
            }
            None => RunState::NotStarted,
        };
        Ok(Self {
            initializer: RunInitializer::new(api.clone(), options),
            api,
            state: Mutex::new(state),
        })
    }

    /// Create the run on the backend and start its heartbeat. Returns the run id.
    ///
    /// May only be called once per reporter, even if it fails.
    pub async fn runner_start(&self, tests: Option<Vec<String>>) -> Result<u64, ReporterError> {
        {
            let mut state = self.state();
            if !matches!(*state, RunState::NotStarted) {
                let err = ReporterError::AlreadyStarted;
                error!("{err}");
                return Err(err);
            }
            *state = RunState::Starting;
        }

        match self.initializer.initialize_run(tests).await {
            Ok(reporter) => {
                let run_id = reporter.test_run_id();
                *self.state() = RunState::Started(Arc::new(reporter));
                Ok(run_id)
            }
            Err(e) => {
                *self.state() = RunState::Ended;
                Err(e)
            }
        }
    }

    /// See [`RunReporter::start_test_case`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_test_case(
        &self,
        id: &str,
        test_case_name: &str,
        params: Option<AdditionalTestCaseParams>,
    ) -> Result<PendingResult, ReporterError> {
        self.reporter(Operation::StartTestCase)?
            .start_test_case(id, test_case_name, params)
    }

    /// See [`RunReporter::submit_test_case_result`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_test_case_result(
        &self,
        id: &str,
        status: TestResultStatus,
        params: Option<AdditionalTestCaseResultParams>,
    ) -> Result<Option<PendingResult>, ReporterError> {
        Ok(self
            .reporter(Operation::SubmitTestCaseResult)?
            .submit_test_case_result(id, status, params))
    }

    pub async fn attach_test_case_asset(
        &self,
        id: &str,
        asset_name: &str,
        provider_session_guid: &str,
        asset_type: AssetType,
        asset: Bytes,
    ) -> Result<(), ReporterError> {
        self.reporter(Operation::AttachTestCaseAsset)?
            .attach_test_case_asset(id, asset_name, provider_session_guid, asset_type, asset)
            .await
    }

    /// Wait for all outstanding reporting and close the run.
    ///
    /// A failed end leaves the run open so the call can be retried.
    pub async fn runner_end(&self) -> Result<(), ReporterError> {
        let reporter = self.reporter(Operation::EndRun)?;
        reporter.runner_end().await?;
        *self.state() = RunState::Ended;
        Ok(())
    }

    /// Id of the active run, once one exists.
    pub fn run_id(&self) -> Option<u64> {
        match &*self.state() {
            RunState::Started(reporter) => Some(reporter.test_run_id()),
            _ => None,
        }
    }

    /// True when no run is active and no backend call is outstanding.
    pub fn is_synchronized(&self) -> bool {
        let idle = !matches!(*self.state(), RunState::Started(_));
        idle && self.api.calls_in_flight() == 0
    }

    fn reporter(&self, op: Operation) -> Result<Arc<RunReporter>, ReporterError> {
        let err = match &*self.state() {
            RunState::Started(reporter) => return Ok(reporter.clone()),
            RunState::Ended => ReporterError::AlreadyFinished(op),
            RunState::NotStarted | RunState::Starting => ReporterError::NotInitialized(op),
        };
        error!("{err}");
        Err(err)
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
