//! Job supervision service.
//!
//! [`service::JobService`] ties the core launcher, artifact store, and the
//! in-memory [`registry::JobRegistry`] together. Held in
//! [`AppState`](crate::state::AppState) as an `Arc<JobService>`.

pub mod registry;
pub mod service;
