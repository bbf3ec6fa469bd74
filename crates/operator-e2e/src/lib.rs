//! End-to-end convergence checks for a Kubernetes database cluster operator.
//!
//! The operator under test is a black box: every check mutates a custom
//! resource, a node, or the operator's config map through the platform API,
//! then polls live cluster state until the requested state is observed or a
//! deadline passes.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use operator_e2e::{scenarios, ClusterFixture, HarnessConfig, KubePlatform, SuiteRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HarnessConfig::default();
//!     let platform = KubePlatform::connect(&config).await?;
//!     let fixture = ClusterFixture::new(Arc::new(platform), config);
//!     fixture.setup().await?;
//!     let report = SuiteRunner::default().run(&fixture, &scenarios::all()).await;
//!     println!("{} passed", report.passed());
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod barrier;
pub mod config;
pub mod error;
pub mod failover;
pub mod fixture;
pub mod platform;
pub mod poller;
pub mod runner;
pub mod scenarios;
pub mod selector;
pub mod topology;
pub mod ui;

// Re-export commonly used types at the crate root
pub use config::HarnessConfig;
pub use error::{E2eError, Result};
pub use fixture::ClusterFixture;
pub use platform::kubernetes::KubePlatform;
pub use platform::{PlatformClient, PlatformError, ResourceKind, ResourceSummary};
pub use poller::{PollSettings, Poller, Probe};
pub use runner::{ScenarioOutcome, SuiteReport, SuiteRunner};
pub use selector::LabelSelector;
pub use topology::ClusterTopology;
