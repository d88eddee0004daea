//! In-memory collaborators for exercising spawnq without Redis, PostgreSQL
//! or a container orchestrator.

mod notebook;
mod orchestrator;
mod persistence;
mod store;

pub use notebook::*;
pub use orchestrator::*;
pub use persistence::*;
pub use store::*;
