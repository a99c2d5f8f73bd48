//! Developmental milestone tests for children.
//!
//! Administrators author age-targeted test templates; parents take them in
//! a single in-memory session, get a percentage score and the feedback
//! whose score range contains it. Results are stored as immutable
//! snapshots.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod recommend;
pub mod report;
pub mod scoring;
pub mod session;
pub mod store;

pub use db::Database;
pub use error::{MilestoneError, ScoringError, SessionError, StoreError};
pub use orchestrator::Orchestrator;
pub use session::SessionManager;
pub use store::{ChildRegistry, TestStore};
