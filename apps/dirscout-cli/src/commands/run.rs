//! Shared collection flow for every credential subcommand

use crate::error::CliResult;
use crate::output::{print_header, print_key_value, print_success, print_warning, render_coverage};
use chrono::{DateTime, Local};
use clap::{Args, ValueEnum};
use dirscout_aad::{
    AadResult, BackfillTargets, CloudEnvironment, CollectorConfig, CoverageSet,
    EnumerationOrchestrator, EnumerationOutcome, JsonLinesSink, TokenProvider,
    DEFAULT_API_VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Cloud environment selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CloudArg {
    Public,
    UsGovernment,
    China,
    Germany,
}

impl From<CloudArg> for CloudEnvironment {
    fn from(arg: CloudArg) -> Self {
        match arg {
            CloudArg::Public => CloudEnvironment::Public,
            CloudArg::UsGovernment => CloudEnvironment::UsGovernment,
            CloudArg::China => CloudEnvironment::China,
            CloudArg::Germany => CloudEnvironment::Germany,
        }
    }
}

/// Which APIs to collect from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Directory objects only
    Aad,
    /// Resource manager only
    Arm,
    /// Both
    Both,
}

impl Mode {
    fn includes_directory(self) -> bool {
        matches!(self, Mode::Aad | Mode::Both)
    }

    fn includes_resource_manager(self) -> bool {
        matches!(self, Mode::Arm | Mode::Both)
    }
}

/// Options shared by every credential subcommand
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Cloud environment hosting the tenant
    #[arg(long, value_enum, default_value_t = CloudArg::Public)]
    pub cloud: CloudArg,

    /// APIs to collect from
    #[arg(long, value_enum, default_value_t = Mode::Both)]
    pub mode: Mode,

    /// JSON file mapping object kinds to ids to re-collect
    #[arg(long, value_name = "FILE")]
    pub backfill: Option<PathBuf>,

    /// Only collect these subscriptions
    #[arg(short = 'i', long = "include-subs", value_name = "SUB", num_args = 1..)]
    pub include_subs: Vec<String>,

    /// Skip these subscriptions
    #[arg(short = 'e', long = "exclude-subs", value_name = "SUB", num_args = 1..)]
    pub exclude_subs: Vec<String>,

    /// Output directory (defaults to results_<timestamp>)
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Directory API endpoint override
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Directory API version; empty to omit the parameter
    #[arg(long, value_name = "VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,
}

impl RunArgs {
    fn output_dir(&self, started: DateTime<Local>) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_dir(started))
    }
}

pub(crate) fn default_output_dir(started: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("results_{}", started.format("%Y%m%d-%H%M%S")))
}

pub(crate) fn build_config(tenant_id: &str, args: &RunArgs) -> CliResult<CollectorConfig> {
    let api_version = Some(args.api_version.clone()).filter(|v| !v.is_empty());
    let mut builder = CollectorConfig::builder()
        .tenant_id(tenant_id)
        .cloud(args.cloud.into())
        .api_version(api_version);
    if let Some(endpoint) = &args.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    Ok(builder.build()?)
}

async fn load_backfill(path: &Path) -> CliResult<BackfillTargets> {
    let json = tokio::fs::read_to_string(path).await?;
    Ok(BackfillTargets::from_json(&json)?)
}

/// Execute a collection run with the given credentials
pub async fn execute(
    provider: Arc<dyn TokenProvider>,
    tenant_id: String,
    args: RunArgs,
) -> CliResult<()> {
    let started = Local::now();
    info!(tenant_id = %tenant_id, cloud = %CloudEnvironment::from(args.cloud), "Starting collection");

    if args.mode.includes_resource_manager() {
        collect_resource_manager(&args);
    }

    let result = if args.mode.includes_directory() {
        collect_directory(provider, &tenant_id, &args, started).await
    } else {
        Ok(())
    };

    let finished = Local::now();
    info!(
        "Collection finished in {} seconds",
        (finished - started).num_seconds()
    );
    print_key_value("Completed", &completion_line(started, finished));
    result
}

/// Finish timestamp with the elapsed run time.
pub(crate) fn completion_line(started: DateTime<Local>, finished: DateTime<Local>) -> String {
    format!(
        "{} ({} seconds)",
        finished.format("%Y-%m-%d %H:%M:%S"),
        (finished - started).num_seconds()
    )
}

fn collect_resource_manager(args: &RunArgs) {
    warn!(
        include_subs = ?args.include_subs,
        exclude_subs = ?args.exclude_subs,
        "Resource manager collection is not implemented; skipping"
    );
}

async fn collect_directory(
    provider: Arc<dyn TokenProvider>,
    tenant_id: &str,
    args: &RunArgs,
    started: DateTime<Local>,
) -> CliResult<()> {
    let config = build_config(tenant_id, args)?;
    let backfill = match &args.backfill {
        Some(path) => Some(load_backfill(path).await?),
        None => None,
    };

    let output = args.output_dir(started);
    let sink = Arc::new(JsonLinesSink::create(&output).await?);
    let orchestrator = EnumerationOrchestrator::new(config, provider, sink);

    let result = orchestrator.run(backfill.as_ref()).await;
    match &result {
        Ok(EnumerationOutcome::NoAccess) => {
            print_warning("The identity cannot read the directory; nothing was collected.");
        }
        Ok(EnumerationOutcome::Completed(report)) => {
            print_success(&format!(
                "Collected {} records with {} crawlers",
                report.records, report.crawlers
            ));
        }
        Err(e) => print_warning(&format!("Collection finished with errors: {e}")),
    }
    if let Some(table) = directory_summary(&result, orchestrator.coverage()) {
        print_header("Directory coverage");
        print!("{table}");
        print_key_value("Output", &output.display().to_string());
    }
    result?;
    Ok(())
}

/// Coverage table for a run that started crawling, including runs where some
/// crawlers failed. `None` when the access check stopped the run.
pub(crate) fn directory_summary(
    result: &AadResult<EnumerationOutcome>,
    coverage: &CoverageSet,
) -> Option<String> {
    match result {
        Ok(EnumerationOutcome::NoAccess) => None,
        _ => Some(render_coverage(coverage)),
    }
}
