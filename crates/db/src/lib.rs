mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use error::*;
pub use models::{EventRow, ProjectRow, TaskRow};
pub use pool::*;
pub use repositories::*;
