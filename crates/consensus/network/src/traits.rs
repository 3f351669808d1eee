//! Collaborator interfaces.
//!
//! Everything in this module is an *interface* onto an external collaborator: the ledger store,
//! the peer network transport, the representative wallet, and the set of currently-connected
//! peers. Production code implements these against the real ledger/network/wallet;
//! `tn-test-utils` supplies in-memory fakes for engine tests.

use async_trait::async_trait;
use std::{future::Future, pin::Pin, sync::Arc};
use tn_types::{Endpoint, Hash, RepPrivateKey, RepPublicKey, Root, TelemetryData, Vote};

/// A send that may fail; the engines never retry at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel send failed")]
pub struct SendError;

/// A future representing an in-flight send over a `Channel`.
pub type ChannelSendFuture = Pin<Box<dyn Future<Output = Result<(), SendError>> + Send>>;

/// Recent votes cached by hash, keyed on the hash they endorse.
pub trait VoteCache: Send + Sync {
    /// Returns any cached votes for `hash`, empty if none are cached.
    fn find(&self, hash: &Hash) -> Vec<Vote>;

    /// Caches a freshly generated (or forwarded) vote.
    fn insert(&self, vote: Vote);
}

/// The local node's voting representative key pairs.
pub trait RepresentativeSet: Send + Sync {
    /// Public/private key pairs of every representative this node votes as.
    fn representatives(&self) -> Vec<(RepPublicKey, RepPrivateKey)>;

    /// Whether this node holds at least one voting representative.
    ///
    /// Calling `RequestAggregator::add` otherwise is a programming error; implementations should
    /// make this cheap enough to call on every `add`.
    fn has_voting_representative(&self) -> bool {
        !self.representatives().is_empty()
    }
}

/// A scoped read transaction over the block store, bounded to a single aggregation pass.
pub trait BlockStoreReadTxn {
    /// Whether `hash` names a block known to the store.
    fn block_exists(&self, hash: &Hash) -> bool;

    /// The successor of the block named by `hash`, if any.
    fn block_successor(&self, hash: &Hash) -> Option<Hash>;

    /// The open block of the account named by `account`, if the account is known.
    fn account_open_block(&self, account: &Hash) -> Option<Hash>;

    /// Fetches the block identified by `hash`. Callers only invoke this after confirming the
    /// block exists (e.g. via `block_successor`), so implementations may assume presence.
    fn block_get(&self, hash: &Hash) -> Option<Hash>;

    /// Generates a vote over `hashes` signed by `(public, private)`.
    fn generate_vote(
        &self,
        public: RepPublicKey,
        private: RepPrivateKey,
        hashes: &[Hash],
    ) -> Vote;
}

/// The ledger store, accessed only through short-lived read transactions.
pub trait BlockStore: Send + Sync {
    type ReadTxn<'a>: BlockStoreReadTxn
    where
        Self: 'a;

    fn begin_read(&self) -> Self::ReadTxn<'_>;
}

/// A live connection to one peer.
#[async_trait]
pub trait Channel: Send + Sync {
    /// The peer's normalized network address.
    fn endpoint(&self) -> Endpoint;

    /// The peer's advertised protocol version.
    fn protocol_version(&self) -> u8;

    /// Sends a `confirm_ack` carrying `vote`.
    fn send_confirm_ack(&self, vote: Vote) -> ChannelSendFuture;

    /// Sends a `publish` carrying the block identified by `hash` (used when aggregation
    /// discovers a successor block the requester may not have).
    fn send_publish(&self, hash: Hash) -> ChannelSendFuture;

    /// Sends an empty-payload `telemetry_req`.
    fn send_telemetry_req(&self) -> ChannelSendFuture;
}

/// The set of currently-connected peer channels.
pub trait PeerRegistry: Send + Sync {
    /// Snapshot of all connected channels.
    fn connected_channels(&self) -> Vec<Arc<dyn Channel>>;
}

/// A root+hash pair as received in an inbound `confirm_req`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashRoot {
    pub hash: Hash,
    pub root: Root,
}

/// Supplies this node's own telemetry snapshot, for answering an inbound `telemetry_req`.
///
/// The telemetry cache is the natural place to hang this, since it already owns the wire-exact
/// `TelemetryData` type and the cache-cutoff bookkeeping for outbound probes.
pub trait LocalTelemetrySource: Send + Sync {
    fn local_telemetry(&self) -> TelemetryData;
}
