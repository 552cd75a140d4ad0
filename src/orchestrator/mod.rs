//! Run orchestration.
//!
//! This module owns the run lifecycle (start once, report, end once) and the
//! correlation of local test ids with server-side results. Test framework
//! adapters and the CLI call into this module rather than the API clients.

mod controller;
mod reporter;

pub use controller::{ApplauseReporter, Connection, RunResumeToken, RUN_ID_ENV};
pub use reporter::{
    write_provider_links, PendingResult, ReporterOptions, RunInitializer, RunReporter,
    PROVIDER_URLS_FILE,
};
