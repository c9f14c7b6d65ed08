//! Background job queues
//!
//! [`QueueClient`] is the producer side, [`WorkerDispatcher`](crate::worker::WorkerDispatcher)
//! the consumer side. Both talk to a [`QueueBackend`] opened through a [`QueueBroker`].

mod backend;
mod client;
mod job;
mod memory;

pub use backend::{QueueBackend, QueueBroker, QueueEvent};
pub use client::{QueueClient, QueueOptions};
pub use job::{Job, JobOptions, JobState, QueueJob};
pub use memory::{InMemoryBroker, MemoryQueue};
