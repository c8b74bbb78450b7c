//! Workflow engine for an AI-driven development assistant.
//!
//! A workflow is a JSON list of typed nodes. Each node names a plugin that
//! reads bindings from a shared store and writes its outputs back; loop and
//! branch nodes nest further node lists. The default workflow drives a chat
//! model through repeated tool-calling rounds against the repository.
//!
//! - **[`core`]**: Pure logic (bindings, value coercion, conditions, workflow
//!   types and checks). No I/O.
//! - **[`io`]**: Side effects (config, prompt and workflow files, processes,
//!   completion API, forge, notifications).
//!
//! [`engine`] and [`executor`] interpret workflows, [`driver`] runs the same
//! cycle without the interpreter, and [`supervisor`] keeps at most one run
//! active.

pub mod bootstrap;
pub mod core;
pub mod dispatcher;
pub mod driver;
pub mod engine;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plugins;
pub mod registry;
pub mod runtime;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
