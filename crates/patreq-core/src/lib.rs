//! Core types, pure status logic and engine components for patron item
//! requests.
//!
//! This crate has no HTTP or database dependencies. The
//! backing service is reached through [`service::RequestService`]; every
//! engine component is generic over it.

pub mod admission;
pub mod batch;
pub mod cancel;
pub mod claim;
pub mod context;
pub mod disposition;
pub mod error;
pub mod queue;
pub mod repository;
pub mod request;
pub mod routing;
pub mod service;
pub mod status;

pub use error::{Error, Result, ServiceEvent};

#[cfg(test)]
mod testing;
