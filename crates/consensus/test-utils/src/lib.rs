//! In-memory collaborator fakes shared by the aggregator and telemetry crates' test suites.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    net::{Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU16, AtomicU64, Ordering},
        Arc,
    },
};
use tn_network::{
    BlockStore, BlockStoreReadTxn, Channel, ChannelSendFuture, PeerRegistry, RepresentativeSet,
    SendError, VoteCache,
};
use tn_types::{Endpoint, Hash, RepPrivateKey, RepPublicKey, TelemetryData, Vote};
use tokio::sync::mpsc;

/// A message captured from a `FakeChannel`, for asserting what the aggregator/telemetry engines
/// actually sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    ConfirmAck(Vote),
    Publish(Hash),
    TelemetryReq,
}

struct FakeChannel {
    endpoint: Endpoint,
    protocol_version: u8,
    sent: mpsc::UnboundedSender<SentMessage>,
}

#[async_trait]
impl Channel for FakeChannel {
    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    fn send_confirm_ack(&self, vote: Vote) -> ChannelSendFuture {
        let sent = self.sent.clone();
        Box::pin(async move { sent.send(SentMessage::ConfirmAck(vote)).map_err(|_| SendError) })
    }

    fn send_publish(&self, hash: Hash) -> ChannelSendFuture {
        let sent = self.sent.clone();
        Box::pin(async move { sent.send(SentMessage::Publish(hash)).map_err(|_| SendError) })
    }

    fn send_telemetry_req(&self) -> ChannelSendFuture {
        let sent = self.sent.clone();
        Box::pin(async move { sent.send(SentMessage::TelemetryReq).map_err(|_| SendError) })
    }
}

static NEXT_PORT: AtomicU16 = AtomicU16::new(10_000);

/// A channel to a distinct fake peer, plus the receiving end of everything sent on it.
///
/// `_now` is accepted (rather than generating a timestamp internally) so call sites can thread
/// the same `Instant` they're using to drive a pool.
pub fn fake_channel(
    _now: std::time::Instant,
) -> (Arc<dyn Channel>, mpsc::UnboundedReceiver<SentMessage>) {
    let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
    let endpoint = Endpoint::new(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(FakeChannel { endpoint, protocol_version: 20, sent: tx }), rx)
}

/// An in-memory ledger fake: callers populate blocks/successors/accounts directly.
#[derive(Default)]
pub struct FakeBlockStore {
    blocks: Mutex<HashSet<Hash>>,
    successors: Mutex<HashMap<Hash, Hash>>,
    account_open: Mutex<HashMap<Hash, Hash>>,
    next_sequence: AtomicU64,
}

impl FakeBlockStore {
    pub fn insert_block(&self, hash: Hash) {
        self.blocks.lock().insert(hash);
    }

    pub fn insert_successor(&self, of: Hash, successor: Hash) {
        self.successors.lock().insert(of, successor);
        self.blocks.lock().insert(successor);
    }

    pub fn insert_account_open(&self, account: Hash, open: Hash) {
        self.account_open.lock().insert(account, open);
        self.blocks.lock().insert(open);
    }
}

pub fn fake_block_store() -> FakeBlockStore {
    FakeBlockStore::default()
}

pub struct FakeReadTxn<'a> {
    store: &'a FakeBlockStore,
}

impl BlockStoreReadTxn for FakeReadTxn<'_> {
    fn block_exists(&self, hash: &Hash) -> bool {
        self.store.blocks.lock().contains(hash)
    }

    fn block_successor(&self, hash: &Hash) -> Option<Hash> {
        self.store.successors.lock().get(hash).copied()
    }

    fn account_open_block(&self, account: &Hash) -> Option<Hash> {
        self.store.account_open.lock().get(account).copied()
    }

    fn block_get(&self, hash: &Hash) -> Option<Hash> {
        self.store.blocks.lock().get(hash).copied()
    }

    fn generate_vote(&self, public: RepPublicKey, _private: RepPrivateKey, hashes: &[Hash]) -> Vote {
        let sequence = self.store.next_sequence.fetch_add(1, Ordering::Relaxed);
        Vote::new(public, sequence, hashes.to_vec(), vec![])
    }
}

impl BlockStore for FakeBlockStore {
    type ReadTxn<'a> = FakeReadTxn<'a>;

    fn begin_read(&self) -> Self::ReadTxn<'_> {
        FakeReadTxn { store: self }
    }
}

/// An in-memory vote cache: votes are indexed by every hash they cover.
#[derive(Default)]
pub struct FakeVoteCache {
    votes: Mutex<HashMap<Hash, Vec<Vote>>>,
}

impl VoteCache for FakeVoteCache {
    fn find(&self, hash: &Hash) -> Vec<Vote> {
        self.votes.lock().get(hash).cloned().unwrap_or_default()
    }

    fn insert(&self, vote: Vote) {
        let mut votes = self.votes.lock();
        for hash in &vote.hashes {
            votes.entry(*hash).or_default().push(vote.clone());
        }
    }
}

/// A fixed set of local voting representatives.
pub struct FakeRepresentativeSet {
    reps: Vec<(RepPublicKey, RepPrivateKey)>,
}

impl FakeRepresentativeSet {
    pub fn with_one() -> Self {
        Self { reps: vec![([1u8; 32], [2u8; 32])] }
    }

    pub fn empty() -> Self {
        Self { reps: Vec::new() }
    }
}

impl RepresentativeSet for FakeRepresentativeSet {
    fn representatives(&self) -> Vec<(RepPublicKey, RepPrivateKey)> {
        self.reps.clone()
    }
}

/// A mutable set of connected channels, for tests that drive peer fan-out.
#[derive(Default)]
pub struct FakePeerRegistry {
    channels: Mutex<Vec<Arc<dyn Channel>>>,
}

impl FakePeerRegistry {
    pub fn push(&self, channel: Arc<dyn Channel>) {
        self.channels.lock().push(channel);
    }
}

impl PeerRegistry for FakePeerRegistry {
    fn connected_channels(&self) -> Vec<Arc<dyn Channel>> {
        self.channels.lock().clone()
    }
}

/// Builds a `Hash` whose bytes are all `byte`, for tests that don't care about specific values.
pub fn hash(byte: u8) -> Hash {
    Hash::from([byte; 32])
}

/// Builds a minimal `Vote` for cache/dedup tests.
pub fn vote(representative: RepPublicKey, sequence: u64, hashes: Vec<Hash>) -> Vote {
    Vote::new(representative, sequence, hashes, vec![])
}

/// Builds a `TelemetryData` with distinguishable, non-default fields, for consolidation tests.
pub fn telemetry(block_count: u64, peer_count: u32) -> TelemetryData {
    TelemetryData {
        block_count,
        peer_count,
        account_count: block_count,
        cemented_count: block_count,
        unchecked_count: 0,
        uptime: 1_000,
        bandwidth_cap: 1_000_000,
        protocol_version: 20,
        genesis_block: Hash::ZERO,
        major_version: 26,
        minor_version: Some(0),
        patch_version: Some(0),
        pre_release_version: Some(0),
        maker: Some(0),
        timestamp: Some(0),
    }
}
