mod annotation;
mod event;
mod outcome;
mod phase;
mod project;
mod scope;
mod task;

pub use annotation::*;
pub use event::*;
pub use outcome::*;
pub use phase::*;
pub use project::*;
pub use scope::*;
pub use task::*;
