//! Core data model shared by the request-aggregator and telemetry crates.
//!
//! This crate defines only data: identifiers, the wire telemetry payload, and the error
//! taxonomy. It has no opinion on transport, storage, or concurrency.

mod endpoint;
mod hash;
mod telemetry_data;
mod vote;

pub mod error;

pub use endpoint::Endpoint;
pub use hash::{Hash, Root};
pub use telemetry_data::{checked_narrow_u32, checked_narrow_u64, TelemetryData, VersionParts};
pub use vote::{RepPrivateKey, RepPublicKey, Vote};
