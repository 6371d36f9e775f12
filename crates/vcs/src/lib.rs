pub mod config;
pub mod error;
pub mod git;
pub mod traits;

pub use config::WorktreeConfig;
pub use error::{Result, VcsError};
pub use git::GitWorktrees;
pub use traits::{TaskWorktree, WorkingTreeManager};
