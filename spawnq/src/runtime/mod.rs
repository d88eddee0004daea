/// Queue-to-spawner dispatcher and its worker pool.
pub mod dispatcher;
/// Worker configuration.
pub mod worker;

pub use dispatcher::{DispatchStatus, QueueDispatcher};
pub use worker::WorkerConfig;
