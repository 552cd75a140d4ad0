use anyhow::{anyhow, Context, Result};
use applause_reporter::config::{load_config, ConfigLoadProperties, PartialApplauseConfig};
use applause_reporter::model::{AdditionalTestCaseResultParams, TestResultStatus};
use applause_reporter::orchestrator::RUN_ID_ENV;
use applause_reporter::test_case_name::parse_test_case_name;
use applause_reporter::{ApplauseReporter, Connection, ReporterOptions, RunResumeToken};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "applause-reporter",
    version,
    about = "Report automated test results to Applause"
)]
pub struct Cli {
    /// Config file, relative to the working directory
    #[arg(long, global = true, default_value = "applause.json")]
    pub config: PathBuf,

    /// Override the API key from the config file
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Override the product id from the config file
    #[arg(long, global = true)]
    pub product_id: Option<i64>,

    /// Automation API request timeout
    #[arg(long, global = true)]
    pub timeout: Option<humantime::Duration>,

    /// Log debug output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Create a test run and print its id
    Start {
        /// Name of a test expected in this run; may be repeated
        #[arg(long = "test")]
        tests: Vec<String>,
    },
    /// Create and submit one test case result in an existing run
    Submit {
        /// Run to report into (defaults to $APPLAUSE_RUN_ID)
        #[arg(long)]
        run_id: Option<u64>,
        /// Local id of the test case
        #[arg(long)]
        id: String,
        /// Test case name, optionally carrying TestRail-<n> / Applause-<n> ids
        #[arg(long)]
        name: String,
        #[arg(long)]
        status: TestResultStatus,
        #[arg(long)]
        failure_reason: Option<String>,
    },
    /// End an existing run
    End {
        /// Run to end (defaults to $APPLAUSE_RUN_ID)
        #[arg(long)]
        run_id: Option<u64>,
        /// Directory for the provider links file
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Print how a test case name is split into name and case ids
    Parse { name: String },
}

pub async fn run(args: Cli) -> Result<()> {
    match &args.command {
        Command::Parse { name } => {
            let parsed = parse_test_case_name(name);
            println!("{}", serde_json::to_string_pretty(&parsed)?);
            Ok(())
        }
        Command::Start { tests } => {
            let reporter = build_reporter(&args, ReporterOptions::default())?;
            let tests = (!tests.is_empty()).then(|| tests.clone());
            let run_id = reporter
                .runner_start(tests)
                .await
                .context("failed to start test run")?;
            println!("{run_id}");
            Ok(())
        }
        Command::Submit {
            run_id,
            id,
            name,
            status,
            failure_reason,
        } => {
            let options = ReporterOptions {
                resume: Some(resume_token(*run_id)?),
                ..ReporterOptions::default()
            };
            let reporter = build_reporter(&args, options)?;
            reporter.start_test_case(id, name, None)?;
            let params = AdditionalTestCaseResultParams {
                failure_reason: failure_reason.clone(),
                ..Default::default()
            };
            let submitted = reporter
                .submit_test_case_result(id, *status, Some(params))?
                .ok_or_else(|| anyhow!("test case `{id}` was not started"))?;
            let result_id = submitted.await.context("failed to submit test case result")?;
            println!("{result_id}");
            Ok(())
        }
        Command::End { run_id, output_dir } => {
            let options = ReporterOptions {
                resume: Some(resume_token(*run_id)?),
                output_dir: output_dir.clone(),
                ..ReporterOptions::default()
            };
            let reporter = build_reporter(&args, options)?;
            reporter
                .runner_end()
                .await
                .context("failed to end test run")?;
            Ok(())
        }
    }
}

fn build_reporter(args: &Cli, options: ReporterOptions) -> Result<ApplauseReporter> {
    let load = ConfigLoadProperties {
        config_file: Some(args.config.clone()),
        properties: Some(overrides(args)),
    };
    let config = load_config(&load)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    ApplauseReporter::new(Connection::Config(config.auto_api), options)
        .context("failed to create reporter")
}

fn overrides(args: &Cli) -> PartialApplauseConfig {
    PartialApplauseConfig {
        api_key: args.api_key.clone(),
        product_id: args.product_id,
        timeout: args
            .timeout
            .map(|t| Duration::from(t).as_millis().try_into().unwrap_or(u64::MAX)),
        ..Default::default()
    }
}

fn resume_token(run_id: Option<u64>) -> Result<RunResumeToken> {
    run_id
        .map(RunResumeToken::new)
        .or_else(RunResumeToken::from_env)
        .ok_or_else(|| anyhow!("no run id given; pass --run-id or set {RUN_ID_ENV}"))
}
