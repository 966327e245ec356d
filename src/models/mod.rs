//! Core data model: documents, extracted entities, and review tasks.

mod document;
mod entity;
mod review;

pub use document::{Document, DocumentStatus, DocumentSummary, FailureReason};
pub use entity::{EntityRecord, EntitySource, Resolution};
pub use review::{ReviewTask, ReviewTaskStatus};
