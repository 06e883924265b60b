//! Paginated enumeration of one object type.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::directory_client::{DirectoryPage, DirectorySession};
use crate::handler::{self, LinkedResources};
use crate::object_types::ObjectTypeDescriptor;
use crate::refresher::{Clock, CredentialRefresher, ReadinessGate, SystemClock};
use crate::{AadError, AadResult, CollectorConfig, CoverageSet, DirectoryRecord, RecordSink, TokenProvider};

/// What a crawler fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlTarget {
    /// Every object of the type, following continuation cursors.
    Full,
    /// One object by id (backfill).
    Object(String),
}

impl CrawlTarget {
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        match self {
            Self::Full => None,
            Self::Object(id) => Some(id),
        }
    }
}

impl fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Object(id) => write!(f, "object {id}"),
        }
    }
}

/// Enumerates one type (or one object of it) with its own token refresher
/// and network session.
pub struct DirectoryObjectCrawler {
    descriptor: &'static ObjectTypeDescriptor,
    target: CrawlTarget,
    config: Arc<CollectorConfig>,
    provider: Arc<dyn TokenProvider>,
    sink: Arc<dyn RecordSink>,
    coverage: CoverageSet,
    clock: Arc<dyn Clock>,
}

impl DirectoryObjectCrawler {
    #[must_use]
    pub fn new(
        descriptor: &'static ObjectTypeDescriptor,
        target: CrawlTarget,
        config: Arc<CollectorConfig>,
        provider: Arc<dyn TokenProvider>,
        sink: Arc<dyn RecordSink>,
        coverage: CoverageSet,
    ) -> Self {
        Self {
            descriptor,
            target,
            config,
            provider,
            sink,
            coverage,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> &'static ObjectTypeDescriptor {
        self.descriptor
    }

    #[must_use]
    pub fn target(&self) -> &CrawlTarget {
        &self.target
    }

    /// Runs the crawl to completion and returns the number of records written.
    ///
    /// The refresher is cancelled and the session released whether the crawl
    /// succeeds or fails.
    ///
    /// # Errors
    ///
    /// Returns the initial token failure, a directory error for any page, or
    /// a sink failure.
    #[instrument(skip(self), fields(type_name = %self.descriptor.type_name, target = %self.target))]
    pub async fn run(self) -> AadResult<u64> {
        let session = DirectorySession::new(&self.config)?;
        let refresher = CredentialRefresher::start_with_clock(
            Arc::clone(&self.provider),
            self.config.audience.clone(),
            self.descriptor.type_name,
            Arc::clone(&self.clock),
        )
        .await?;
        let gate = refresher.gate();

        let result = self.crawl(&session, &gate).await;

        refresher.cancel();
        drop(session);
        result
    }

    async fn crawl(&self, session: &DirectorySession, gate: &ReadinessGate) -> AadResult<u64> {
        let type_name = self.descriptor.type_name;
        let full = self.target == CrawlTarget::Full;
        if full {
            info!("Starting query for {}", type_name);
        } else {
            debug!("Starting backfill query for {} {}", type_name, self.target);
        }

        let links = SessionLinks { session, gate };
        let mut url = session.object_url(self.descriptor.resource_path, self.target.object_id());
        let mut written = 0u64;

        loop {
            match session.get(&url, gate).await? {
                DirectoryPage::Collection { items, next_link } => {
                    for item in items {
                        self.emit(DirectoryRecord::from_value(item)?, &links).await?;
                        written += 1;
                    }
                    match next_link {
                        Some(cursor) => url = session.cursor_url(&cursor),
                        None => break,
                    }
                }
                DirectoryPage::Object(value) => {
                    self.emit(DirectoryRecord::from_value(value)?, &links).await?;
                    written += 1;
                    break;
                }
            }
        }

        if full {
            info!("Finished query for {} ({} records)", type_name, written);
        } else {
            debug!("Finished backfill query for {} {}", type_name, self.target);
        }
        Ok(written)
    }

    async fn emit(&self, record: DirectoryRecord, links: &SessionLinks<'_>) -> AadResult<()> {
        let type_name = self.descriptor.type_name;
        let record = handler::enrich(self.descriptor, record, links).await?;
        self.sink.append(type_name, &record).await?;
        self.coverage.insert(type_name);
        Ok(())
    }
}

impl fmt::Debug for DirectoryObjectCrawler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryObjectCrawler")
            .field("type_name", &self.descriptor.type_name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Sub-resource fetches through the crawler's own session and gate.
struct SessionLinks<'a> {
    session: &'a DirectorySession,
    gate: &'a ReadinessGate,
}

#[async_trait]
impl<'a> LinkedResources for SessionLinks<'a> {
    async fn linked_ids(
        &self,
        resource_path: &str,
        object_id: &str,
        property: &str,
    ) -> AadResult<Vec<String>> {
        match self
            .session
            .linked_ids(resource_path, object_id, property, self.gate)
            .await
        {
            Err(AadError::DirectoryApi { code, message }) => {
                warn!(
                    "Could not read {} of {}/{}: {} - {}",
                    property, resource_path, object_id, code, message
                );
                Ok(Vec::new())
            }
            other => other,
        }
    }
}
