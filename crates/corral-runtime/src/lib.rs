//! # corral-runtime
//!
//! Orchestration of one request through the Corral pipeline: static
//! validation, cache lookup, compilation, execution via the storage
//! collaborator, and the authorization gate. The engine owns no policy or
//! storage logic of its own; it sequences the collaborators.

pub mod adapter;
pub mod engine;

pub use adapter::StorageAdapter;
pub use engine::{EngineError, QueryEngine};
