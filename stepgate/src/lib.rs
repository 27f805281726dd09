//! Gated, checkpointed orchestration for database major-version migrations.
//!
//! A migration is a declarative [`MigrationPlan`] executed as a sequence of
//! idempotent steps. Every check and step reports [`Finding`]s ranked by
//! [`Severity`]; any `Block` halts forward progress before damage occurs.
//!
//! # Architecture
//!
//! ```text
//! MigrationPlan ──► Pipeline ──► WorkflowRunner ──► Step ...
//!                      │                              │
//!                      ├──► CheckRunner ──► Check ... ├──► UpgradeOrchestrator
//!                      └──► PromotionGate             │
//!                                                     ▼
//!                                              CheckpointStore
//! ```
//!
//! Live systems (MySQL, Kafka, Kafka Connect) are reached only through the
//! inspector and action traits; this crate contains no transport code.

pub mod cdc;
pub mod checks;
pub mod config;
pub mod error;
pub mod finding;
pub mod pipeline;
pub mod plan;
pub mod promotion;
pub mod replica;
pub mod report;
pub mod schema;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};
pub use finding::{Finding, Meta, ResultAggregator, Severity, Summary};
pub use pipeline::{Collaborators, Pipeline};
pub use plan::{load_plan, MigrationPlan, StepKind};
pub use report::Report;

pub use stepgate_state as state;
