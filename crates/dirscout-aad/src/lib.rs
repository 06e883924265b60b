//! Directory object collector for Azure AD tenants.
//!
//! Enumerates users, groups, applications, service principals and directory
//! roles through the directory REST API, expands owners and members, and
//! streams every record to a [`RecordSink`].
//!
//! # Features
//!
//! - Proactive token renewal shared by every request of a crawler
//! - Cursor-based pagination with per-type enrichment
//! - Concurrent crawlers with per-type failure isolation
//! - Full enumeration or backfill of known object ids
//! - Multi-cloud support (Public, US Government, China, Germany)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dirscout_aad::{
//!     AzureCliCredential, CollectorConfig, EnumerationOrchestrator, EnumerationOutcome,
//!     JsonLinesSink,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CollectorConfig::builder()
//!     .tenant_id("your-tenant-id")
//!     .build()?;
//!
//! let sink = Arc::new(JsonLinesSink::create("results").await?);
//! let orchestrator =
//!     EnumerationOrchestrator::new(config, Arc::new(AzureCliCredential::new()), sink);
//!
//! if let EnumerationOutcome::Completed(report) = orchestrator.run(None).await? {
//!     println!("covered: {:?}", report.coverage);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod coverage;
mod crawler;
mod credential;
pub mod directory_client;
mod error;
pub mod handler;
pub mod object_types;
mod orchestrator;
mod record;
pub mod refresher;
mod sink;

// Re-exports
pub use config::{CloudEnvironment, CollectorConfig, CollectorConfigBuilder, DEFAULT_API_VERSION};
pub use coverage::CoverageSet;
pub use crawler::{CrawlTarget, DirectoryObjectCrawler};
pub use credential::{AccessToken, AzureCliCredential, ClientSecretCredential, TokenProvider};
pub use directory_client::{DirectoryPage, DirectorySession};
pub use error::{AadError, AadResult};
pub use handler::LinkedResources;
pub use object_types::{Enrichment, ObjectKind, ObjectTypeDescriptor, OBJECT_TYPES};
pub use orchestrator::{
    BackfillTargets, EnumerationOrchestrator, EnumerationOutcome, EnumerationReport,
};
pub use record::{resolve_object_id, DirectoryRecord};
pub use refresher::{Clock, CredentialRefresher, ReadinessGate, SystemClock};
pub use sink::{JsonLinesSink, MemorySink, RecordSink};
