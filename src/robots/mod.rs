//! Robots.txt handling module
//!
//! This module provides fetching, parsing and caching of robots.txt files.
//! The cache is an explicitly constructed service handed to the engine, so
//! independent engines in one process never share state.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache, RobotsSettings};
pub use parser::ParsedRobots;
