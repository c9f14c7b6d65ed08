//! Consumer side of the job queues

mod dispatcher;
mod handler;

pub use dispatcher::{WorkerDispatcher, WorkerOptions};
pub use handler::JobHandler;
