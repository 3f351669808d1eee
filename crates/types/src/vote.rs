//! A representative's signed endorsement of a set of block hashes.
//!
//! The signature scheme is out of scope for this crate; `Vote` only carries enough structure for
//! the aggregator to cache, dedup, and forward votes it did not itself construct.

use crate::Hash;

/// A representative's public key.
pub type RepPublicKey = [u8; 32];
/// A representative's private key, used only to hand to the block store's vote generator.
pub type RepPrivateKey = [u8; 32];

/// A signed record binding a representative key to an ordered set of hashes.
///
/// `PartialEq`/`Eq`/`Hash` consider only the representative, sequence number, and hash list —
/// this is the "vote identity" the aggregator dedups on in step 3 of `aggregate` (two votes
/// signing the same (rep, sequence, hashes) tuple are the same vote for caching purposes, even if
/// the raw signature bytes differ due to transport re-encoding).
#[derive(Clone, Debug)]
pub struct Vote {
    pub representative: RepPublicKey,
    pub sequence: u64,
    pub hashes: Vec<Hash>,
    pub signature: Vec<u8>,
}

impl Vote {
    pub fn new(
        representative: RepPublicKey,
        sequence: u64,
        hashes: Vec<Hash>,
        signature: Vec<u8>,
    ) -> Self {
        Self { representative, sequence, hashes, signature }
    }

    fn identity(&self) -> (RepPublicKey, u64, &[Hash]) {
        (self.representative, self.sequence, &self.hashes)
    }
}

impl PartialEq for Vote {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Vote {}

impl std::hash::Hash for Vote {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.representative.hash(state);
        self.sequence.hash(state);
        self.hashes.hash(state);
    }
}
