//! Chartflow - medical document processing orchestrator.
//!
//! Ingests uploaded medical documents, runs automated clinical entity
//! extraction, routes low-confidence extractions to human reviewers, and
//! reconciles both result streams into a single validated document record.
//!
//! The orchestration core is the document state machine ([`pipeline`]):
//! every external completion (extraction result, review callback, expiry)
//! is applied to it as an event, serialized per document id.

pub mod cli;
pub mod config;
pub mod extraction;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod server;
pub mod services;
pub mod storage;
