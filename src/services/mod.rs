//! External tools and APIs.

pub mod ffprobe;
pub mod tmdb;
