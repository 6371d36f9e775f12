//! Conflict-aware task orchestration engine.
//!
//! Predicts which files a task will touch, enforces the task phase graph,
//! joins concurrent test and review outcomes, keeps an append-only audit log,
//! and recovers work abandoned by crashed agents.

pub mod activity;
pub mod audit;
pub mod best_effort;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod heartbeat;
pub mod recovery;
pub mod scope;
pub mod state_machine;
pub mod store;
pub mod traits;
pub mod watchdog;

#[cfg(test)]
mod testing;

pub use activity::ActivityRegistry;
pub use audit::AuditLog;
pub use best_effort::BestEffort;
pub use config::EngineConfig;
pub use coordinator::PhaseOutcomeCoordinator;
pub use error::{OrchestratorError, Result};
pub use heartbeat::{write_heartbeat, FileHeartbeatSource, HeartbeatActivity, HeartbeatSource};
pub use recovery::{CrashRecovery, RecoveryPass, RecoverySweep, SweepReport};
pub use scope::ScopePredictor;
pub use state_machine::PhaseStateMachine;
pub use traits::{ActiveWork, IssueStore, ProjectRegistry, ProjectSettings, RecoveryTarget};
pub use watchdog::{CycleReport, Watchdog};
