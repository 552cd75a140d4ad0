//! Errors produced by the reporter.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// An error returned by an Applause backend call.
///
/// Cheap to clone so that a single failure can be handed to every awaiter of a
/// shared pending result.
#[derive(Clone, Debug, Error)]
pub enum ApiError {
    /// The request could not be sent, timed out, or the response body could not be decoded.
    #[error("request to `{endpoint}` failed")]
    Request {
        endpoint: String,
        #[source]
        err: Arc<reqwest::Error>,
    },

    /// The backend answered with a non-success status.
    #[error("`{endpoint}` returned error-code [{status}] with error [{body}]")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The configured base URL cannot be joined with an endpoint path.
    #[error("invalid endpoint URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Test doubles and alternate backends report failures through this variant.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    pub(crate) fn request(endpoint: impl Into<String>, err: reqwest::Error) -> Self {
        Self::Request {
            endpoint: endpoint.into(),
            err: Arc::new(err),
        }
    }

    /// The HTTP status, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Request { err, .. } => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// The reporter operation a sequencing error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    StartTestCase,
    SubmitTestCaseResult,
    AttachTestCaseAsset,
    EndRun,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::StartTestCase => "start a test case",
            Operation::SubmitTestCaseResult => "submit test case result",
            Operation::AttachTestCaseAsset => "attach an asset",
            Operation::EndRun => "end a run",
        };
        f.write_str(s)
    }
}

impl Operation {
    /// The operation phrased against "a run", for sequencing error messages.
    fn against_run(self) -> String {
        match self {
            Operation::EndRun => self.to_string(),
            op => format!("{op} for a run"),
        }
    }
}

/// An error surfaced by the run reporter and its lifecycle controller.
#[derive(Clone, Debug, Error)]
pub enum ReporterError {
    #[error("Cannot start a run - run already started or run already finished")]
    AlreadyStarted,

    #[error("Cannot {} that was never initialized", .0.against_run())]
    NotInitialized(Operation),

    #[error("Cannot {} that already finished", .0.against_run())]
    AlreadyFinished(Operation),

    #[error("testCaseName is required")]
    EmptyTestCaseName,

    #[error("Unable to create test run")]
    RunCreationFailed { status: u16 },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to write provider links to `{}`", .path.display())]
    WriteProviderLinks {
        path: PathBuf,
        #[source]
        err: Arc<std::io::Error>,
    },

    /// A background reporting task panicked or was cancelled.
    #[error("reporting task failed: {0}")]
    TaskFailed(String),
}

/// An error produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config is not complete (missing: {})", .missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },

    #[error("productId must be a positive integer, was: '{0}'")]
    InvalidProductId(i64),

    #[error("{field} is not valid HTTP/HTTPS URL, was: {url}")]
    InvalidUrl { field: &'static str, url: String },

    #[error("apiKey is an empty string!")]
    EmptyApiKey,

    #[error("apiKey contains characters that cannot be sent in an HTTP header")]
    InvalidApiKey,

    #[error("failed to read config file `{}`", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("failed to parse config file `{}`", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },

    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// Error returned while parsing a [`TestResultStatus`](crate::model::TestResultStatus) from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized test result status: {input}\n(known values: {})",
    crate::model::TestResultStatus::ALL.map(|s| s.as_str()).join(", ")
)]
pub struct StatusParseError {
    input: String,
}

impl StatusParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sequencing_messages_are_fixed() {
        assert_eq!(
            ReporterError::NotInitialized(Operation::StartTestCase).to_string(),
            "Cannot start a test case for a run that was never initialized"
        );
        assert_eq!(
            ReporterError::NotInitialized(Operation::SubmitTestCaseResult).to_string(),
            "Cannot submit test case result for a run that was never initialized"
        );
        assert_eq!(
            ReporterError::NotInitialized(Operation::EndRun).to_string(),
            "Cannot end a run that was never initialized"
        );
        assert_eq!(
            ReporterError::NotInitialized(Operation::AttachTestCaseAsset).to_string(),
            "Cannot attach an asset for a run that was never initialized"
        );
        assert_eq!(
            ReporterError::AlreadyFinished(Operation::StartTestCase).to_string(),
            "Cannot start a test case for a run that already finished"
        );
        assert_eq!(
            ReporterError::AlreadyFinished(Operation::EndRun).to_string(),
            "Cannot end a run that already finished"
        );
        assert_eq!(
            ReporterError::AlreadyStarted.to_string(),
            "Cannot start a run - run already started or run already finished"
        );
    }

    #[test]
    fn api_status_is_exposed() {
        let err = ApiError::Status {
            endpoint: "/api/v1.0/test-result".into(),
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(ApiError::Other("nope".into()).status(), None);
    }
}
