//! Deterministic, pure logic shared by the workflow engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod binding;
pub mod condition;
pub mod invariants;
pub mod message;
pub mod roadmap;
pub mod value;
pub mod workflow;
