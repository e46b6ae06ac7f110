//! Domain types for the upscale proxy service.
//!
//! Holds the task model and its status machine, upscale request validation,
//! the in-memory task store, and the shared error type. Nothing in here talks
//! to the network.

pub mod error;
pub mod request;
pub mod store;
pub mod task;
pub mod types;
