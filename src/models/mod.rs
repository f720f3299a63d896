//! Data models.

pub mod config;
pub mod library;
pub mod media;
pub mod task;
