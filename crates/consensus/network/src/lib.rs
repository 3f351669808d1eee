//! Collaborator traits for the request-aggregator and telemetry engines.
//!
//! This crate defines interfaces only: the ledger store, peer transport, representative wallet,
//! and peer registry are external collaborators, implemented by production code that lives
//! outside this workspace and faked in `tn-test-utils` for engine tests.

mod traits;

pub use traits::{
    BlockStore, BlockStoreReadTxn, Channel, ChannelSendFuture, HashRoot, LocalTelemetrySource,
    PeerRegistry, RepresentativeSet, SendError, VoteCache,
};
