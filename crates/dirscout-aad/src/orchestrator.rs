//! Selects crawl targets and runs crawlers concurrently.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use crate::crawler::{CrawlTarget, DirectoryObjectCrawler};
use crate::directory_client::DirectorySession;
use crate::object_types::{self, ObjectTypeDescriptor, OBJECT_TYPES};
use crate::refresher::{Clock, SystemClock};
use crate::{AadError, AadResult, CollectorConfig, CoverageSet, RecordSink, TokenProvider};

/// Object ids per backfill key (`User`, `Group`, `ServicePrincipal`).
///
/// Deserialized from a JSON object; unknown keys are ignored and missing
/// keys mean no ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackfillTargets(HashMap<String, Vec<String>>);

impl BackfillTargets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.0
            .insert(key.into(), ids.into_iter().map(Into::into).collect());
        self
    }

    /// Ids listed under `key`.
    #[must_use]
    pub fn ids(&self, key: &str) -> &[String] {
        self.0.get(key).map_or(&[], Vec::as_slice)
    }

    /// Parses a backfill document.
    ///
    /// # Errors
    ///
    /// Returns `AadError::Json` if the document is not an object of string
    /// arrays.
    pub fn from_json(json: &str) -> AadResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumerationReport {
    /// Crawlers launched.
    pub crawlers: usize,
    /// Records written across all crawlers.
    pub records: u64,
    /// Sorted names of types that produced at least one record.
    pub coverage: Vec<String>,
}

/// Result of [`EnumerationOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumerationOutcome {
    /// The access probe failed; no crawler was started.
    NoAccess,
    Completed(EnumerationReport),
}

/// Launches and supervises one crawler per target.
pub struct EnumerationOrchestrator {
    config: Arc<CollectorConfig>,
    provider: Arc<dyn TokenProvider>,
    sink: Arc<dyn RecordSink>,
    coverage: CoverageSet,
    clock: Arc<dyn Clock>,
}

impl EnumerationOrchestrator {
    #[must_use]
    pub fn new(
        config: CollectorConfig,
        provider: Arc<dyn TokenProvider>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            sink,
            coverage: CoverageSet::new(),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Coverage shared by this orchestrator's crawlers.
    #[must_use]
    pub fn coverage(&self) -> &CoverageSet {
        &self.coverage
    }

    /// Crawl targets for a run: every registered type, or one target per
    /// backfilled id of the backfill-eligible types.
    #[must_use]
    pub fn plan(
        backfill: Option<&BackfillTargets>,
    ) -> Vec<(&'static ObjectTypeDescriptor, CrawlTarget)> {
        match backfill {
            None => OBJECT_TYPES
                .iter()
                .map(|descriptor| (descriptor, CrawlTarget::Full))
                .collect(),
            Some(targets) => object_types::backfill_eligible()
                .flat_map(|descriptor| {
                    let ids = descriptor
                        .backfill_key
                        .map_or(&[][..], |key| targets.ids(key));
                    ids.iter()
                        .map(move |id| (descriptor, CrawlTarget::Object(id.clone())))
                })
                .collect(),
        }
    }

    /// Probes access, then runs every planned crawler to completion.
    ///
    /// Crawlers are never cancelled because a sibling failed. The first
    /// failure to complete is returned once all crawlers have finished.
    ///
    /// # Errors
    ///
    /// Returns the token provider's error if the probe cannot obtain a token,
    /// or the first crawler failure.
    #[instrument(skip_all, fields(tenant_id = %self.config.tenant_id, backfill = backfill.is_some()))]
    pub async fn run(&self, backfill: Option<&BackfillTargets>) -> AadResult<EnumerationOutcome> {
        if !self.probe().await? {
            return Ok(EnumerationOutcome::NoAccess);
        }

        let plan = Self::plan(backfill);
        let crawlers = plan.len();
        info!("Launching {} crawlers", crawlers);

        let mut tasks = JoinSet::new();
        for (descriptor, target) in plan {
            let crawler = DirectoryObjectCrawler::new(
                descriptor,
                target,
                Arc::clone(&self.config),
                Arc::clone(&self.provider),
                Arc::clone(&self.sink),
                self.coverage.clone(),
            )
            .with_clock(Arc::clone(&self.clock));
            tasks.spawn(async move { (descriptor.type_name, crawler.run().await) });
        }

        let mut records = 0;
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(written))) => records += written,
                Ok((type_name, Err(e))) => {
                    error!("Crawler for {} failed: {}", type_name, e);
                    first_error.get_or_insert(e);
                }
                Err(join_error) => {
                    error!("Crawler task failed: {}", join_error);
                    first_error.get_or_insert(AadError::Task(join_error.to_string()));
                }
            }
        }

        let flushed = self.sink.flush().await;
        if let Some(e) = first_error {
            return Err(e);
        }
        flushed?;

        let report = EnumerationReport {
            crawlers,
            records,
            coverage: self.coverage.snapshot(),
        };
        info!(
            "Enumeration complete: {} records from {} crawlers",
            report.records, report.crawlers
        );
        Ok(EnumerationOutcome::Completed(report))
    }

    /// Returns false when the directory refuses a minimal listing request.
    async fn probe(&self) -> AadResult<bool> {
        let token = self.provider.get_token(&self.config.audience).await?;
        let session = DirectorySession::new(&self.config)?;

        match session.get_with_token(&session.probe_url(), &token).await {
            Ok(_) => Ok(true),
            Err(AadError::DirectoryApi { code, message }) => {
                error!("{} - {} - {}", self.config.endpoint, code, message);
                Ok(false)
            }
            Err(e) => {
                error!("{} - {}", self.config.endpoint, e);
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for EnumerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnumerationOrchestrator")
            .field("config", &self.config)
            .field("coverage", &self.coverage)
            .finish_non_exhaustive()
    }
}
