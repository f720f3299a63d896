//! Media Library
//!
//! Scans media library roots, extracts technical metadata with ffprobe,
//! matches titles against TMDB and keeps a deduplicated catalog of movies and
//! series, driven by a recurring task scheduler.

pub mod app;
pub mod cli;
pub mod core;
pub mod error;
pub mod models;
pub mod preflight;
pub mod services;
pub mod store;

pub use error::{Error, Result, ResultExt};
