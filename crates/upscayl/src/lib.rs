//! Upscayl integration.
//!
//! Provides the REST client for the Upscayl API, the provider trait the
//! rest of the service programs against, response interpretation, and the
//! task manager that correlates client task ids with provider tasks.

pub mod api;
pub mod manager;
pub mod provider;
pub mod status;
