//! Service layer orchestrating the processing pipeline.

pub mod processing;
pub mod retry;

pub use processing::{ProcessingEvent, ProcessingResult, ProcessingService};
