//! Domain logic for the GitHub Trending job runner.
//!
//! Everything here is free of HTTP concerns: interpreter resolution,
//! subprocess supervision, artifact naming and lookup, job definitions,
//! and tabular export. The `trending-api` crate wires these into routes.

pub mod artifacts;
pub mod error;
pub mod export;
pub mod jobs;
pub mod scripting;
pub mod types;
