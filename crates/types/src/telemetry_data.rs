//! Wire-exact telemetry payload and its version-string encoding.

use crate::Hash;
use serde::{Deserialize, Serialize};

/// A peer's self-reported health and ledger-state snapshot.
///
/// `Default`/`PartialEq` give the "empty-valued" sentinel used by the telemetry cache to mean
/// "awaiting first response".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryData {
    pub account_count: u64,
    pub block_count: u64,
    pub cemented_count: u64,
    pub unchecked_count: u64,
    pub uptime: u64,
    /// Bytes/sec; `0` means unlimited.
    pub bandwidth_cap: u64,
    pub peer_count: u32,
    pub protocol_version: u8,
    pub genesis_block: Hash,
    pub major_version: u8,
    pub minor_version: Option<u8>,
    pub patch_version: Option<u8>,
    pub pre_release_version: Option<u8>,
    pub maker: Option<u8>,
    /// Milliseconds since epoch, if the peer supplied one.
    pub timestamp: Option<u64>,
}

/// The major/minor/patch/pre_release/maker decomposition of a telemetry version string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VersionParts {
    pub major: u8,
    pub minor: Option<u8>,
    pub patch: Option<u8>,
    pub pre_release: Option<u8>,
    pub maker: Option<u8>,
}

impl VersionParts {
    /// Builds the "." separated string, appending each optional field only if every preceding
    /// field is present.
    pub fn encode(&self) -> String {
        let mut parts = vec![self.major.to_string()];
        'fields: {
            let Some(minor) = self.minor else { break 'fields };
            parts.push(minor.to_string());
            let Some(patch) = self.patch else { break 'fields };
            parts.push(patch.to_string());
            let Some(pre_release) = self.pre_release else { break 'fields };
            parts.push(pre_release.to_string());
            let Some(maker) = self.maker else { break 'fields };
            parts.push(maker.to_string());
        }
        parts.join(".")
    }

    /// Parses a "." separated version string. Optional fields are only populated if all five
    /// fragments are present; any other fragment count yields only `major` (falling back to `0`
    /// if even that is missing or malformed).
    pub fn decode(version: &str) -> Self {
        let fragments: Vec<&str> = version.split('.').collect();
        let major = fragments.first().and_then(|f| f.parse().ok()).unwrap_or(0);
        if fragments.len() == 5 {
            let parse = |i: usize| fragments.get(i).and_then(|f| f.parse().ok());
            Self {
                major,
                minor: parse(1),
                patch: parse(2),
                pre_release: parse(3),
                maker: parse(4),
            }
        } else {
            Self { major, minor: None, patch: None, pre_release: None, maker: None }
        }
    }
}

/// Narrows a wide accumulator down to the output field's width, saturating instead of
/// overflowing.
pub fn checked_narrow_u64(total: u128) -> u64 {
    total.min(u64::MAX as u128) as u64
}

/// Narrows a wide accumulator to `u32`, saturating (used for `peer_count`).
pub fn checked_narrow_u32(total: u128) -> u32 {
    total.min(u32::MAX as u128) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_full_version() {
        let parts = VersionParts {
            major: 23,
            minor: Some(1),
            patch: Some(0),
            pre_release: Some(0),
            maker: Some(2),
        };
        let encoded = parts.encode();
        assert_eq!(encoded, "23.1.0.0.2");
        assert_eq!(VersionParts::decode(&encoded), parts);
    }

    #[test]
    fn major_only_decodes_major_only() {
        let decoded = VersionParts::decode("23");
        assert_eq!(decoded, VersionParts { major: 23, ..Default::default() });
    }

    #[test]
    fn partial_fragments_keep_only_major() {
        // Four fragments is not the "all five present" case.
        let decoded = VersionParts::decode("23.1.0.0");
        assert_eq!(decoded, VersionParts { major: 23, ..Default::default() });
    }

    #[test]
    fn narrowing_saturates() {
        assert_eq!(checked_narrow_u64(u128::MAX), u64::MAX);
        assert_eq!(checked_narrow_u32(u128::MAX), u32::MAX);
    }
}
