//! Client SDK for reporting automated test results to the Applause platform.
//!
//! Start with [`ApplauseReporter`]: create a run, start and submit test cases
//! under local ids of your choosing, then end the run.

pub mod auto_api;
pub mod config;
pub mod errors;
pub mod heartbeat;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod public_api;
pub mod test_case_name;

#[cfg(test)]
mod testing;

pub use orchestrator::{ApplauseReporter, Connection, ReporterOptions, RunResumeToken};
