//! Live feed of audit events.
//!
//! Every event durably appended to the audit log is also published here so
//! in-process observers (the CLI `watch` command, a dispatcher UI) can follow
//! recovery and phase activity without polling the database.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
