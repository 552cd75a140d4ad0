//! Wire types exchanged with the Applause Automation and Public APIs.
//!
//! All DTOs serialize with camelCase field names; optional fields are omitted
//! from the request body when unset.

use crate::errors::StatusParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Request used to create a new Applause test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunCreateDto {
    /// Test case names to pre-create on the run.
    pub tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itw_test_cycle_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunCreateResponseDto {
    pub run_id: u64,
}

/// Caller-supplied fields merged into a test result creation request.
///
/// Any field that is set here wins over the value parsed out of the test case name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalTestCaseParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_session_ids: Option<Vec<String>>,
    /// TestRail test case id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<String>,
    /// Applause test case id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itw_test_case_id: Option<String>,
}

/// Request marking the start of a test result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestCaseResultDto {
    pub test_run_id: u64,
    pub test_case_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_session_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itw_test_case_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestCaseResultResponseDto {
    pub test_result_id: u64,
}

/// Caller-supplied fields passed straight through on result submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalTestCaseResultParams {
    /// Selenium provider session ids to connect to the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_session_guids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_rail_case_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itw_case_id: Option<u64>,
    /// Why the test case failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Request setting the final status of an in-progress test result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestCaseResultDto {
    pub test_result_id: u64,
    pub status: TestResultStatus,
    #[serde(flatten)]
    pub params: AdditionalTestCaseResultParams,
}

/// Status of a single test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestResultStatus {
    NotRun,
    InProgress,
    Passed,
    Failed,
    Skipped,
    Canceled,
    Error,
}

impl TestResultStatus {
    pub const ALL: [TestResultStatus; 7] = [
        TestResultStatus::NotRun,
        TestResultStatus::InProgress,
        TestResultStatus::Passed,
        TestResultStatus::Failed,
        TestResultStatus::Skipped,
        TestResultStatus::Canceled,
        TestResultStatus::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TestResultStatus::NotRun => "NOT_RUN",
            TestResultStatus::InProgress => "IN_PROGRESS",
            TestResultStatus::Passed => "PASSED",
            TestResultStatus::Failed => "FAILED",
            TestResultStatus::Skipped => "SKIPPED",
            TestResultStatus::Canceled => "CANCELED",
            TestResultStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for TestResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestResultStatus {
    type Err = StatusParseError;

    /// Accepts the wire spelling in any case, with `-` allowed in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| StatusParseError::new(s))
    }
}

/// Provider session info returned for results at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultProviderInfo {
    pub test_result_id: u64,
    pub provider_url: String,
    pub provider_session_id: String,
}

/// TestRail settings. Their presence enables TestRail reporting for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRailOptions {
    pub project_id: u64,
    pub suite_id: u64,
    pub plan_name: String,
    pub run_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_all_tests_to_plan: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_test_rail_run_uniqueness: Option<bool>,
}

/// Kind of asset attached to a test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Screenshot,
    FailureScreenshot,
    Video,
    NetworkHar,
    VitalsLog,
    ConsoleLog,
    NetworkLog,
    DeviceLog,
    SeleniumLog,
    SeleniumLogJson,
    BrowserLog,
    FrameworkLog,
    Email,
    PageSource,
    CodeBundle,
    ResultsZip,
    SessionDetails,
    DeviceDetails,
    Unknown,
}

impl AssetType {
    /// Form-field spelling used by the upload endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Screenshot => "SCREENSHOT",
            AssetType::FailureScreenshot => "FAILURE_SCREENSHOT",
            AssetType::Video => "VIDEO",
            AssetType::NetworkHar => "NETWORK_HAR",
            AssetType::VitalsLog => "VITALS_LOG",
            AssetType::ConsoleLog => "CONSOLE_LOG",
            AssetType::NetworkLog => "NETWORK_LOG",
            AssetType::DeviceLog => "DEVICE_LOG",
            AssetType::SeleniumLog => "SELENIUM_LOG",
            AssetType::SeleniumLogJson => "SELENIUM_LOG_JSON",
            AssetType::BrowserLog => "BROWSER_LOG",
            AssetType::FrameworkLog => "FRAMEWORK_LOG",
            AssetType::Email => "EMAIL",
            AssetType::PageSource => "PAGE_SOURCE",
            AssetType::CodeBundle => "CODE_BUNDLE",
            AssetType::ResultsZip => "RESULTS_ZIP",
            AssetType::SessionDetails => "SESSION_DETAILS",
            AssetType::DeviceDetails => "DEVICE_DETAILS",
            AssetType::Unknown => "UNKNOWN",
        }
    }
}

/// Result submitted through the Public API for a test cycle case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunAutoResultDto {
    pub test_cycle_id: u64,
    pub status: TestRunAutoResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_details_json: Option<SessionDetails>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<time::OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<time::OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestRunAutoResultStatus {
    Passed,
    Failed,
    Skipped,
    Canceled,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDetails {
    pub value: SessionDetailsValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetailsValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,
}
