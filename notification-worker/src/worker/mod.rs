//! Dispatch worker: consumer loop, per-queue handlers, and scheduled
//! triggers

pub mod config;
pub mod dispatcher;
pub mod processor;
pub mod scheduler;

pub use config::DispatchConfig;
pub use dispatcher::{Dispatcher, DispatcherState};
pub use processor::{Disposition, EventProcessor, ProcessorError, ProcessorResult};
pub use scheduler::ScheduledTriggers;
