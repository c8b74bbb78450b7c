//! I/O helpers: files, child processes and remote collaborators.

pub mod completion;
pub mod config;
pub mod confirm;
pub mod context;
pub mod forge;
pub mod notify;
pub mod process;
pub mod prompt;
pub mod roadmap;
pub mod tool_catalog;
pub mod translations;
pub mod workflow_store;
