//! Core business logic modules.

pub mod cleanup;
pub mod parser;
pub mod reconciler;
pub mod scanner;
pub mod scheduler;
pub mod setup;
