//! Combines a multiset of peer telemetry into one representative record.
//!
//! Pure and synchronous: no locks, no I/O, nothing but arithmetic over the slice it's given.

use std::collections::HashMap;
use tn_types::{checked_narrow_u32, checked_narrow_u64, Hash, TelemetryData, VersionParts};

/// Consolidates `records` into a single record via trimmed means (numeric fields) and modes
/// (categorical fields).
pub fn consolidate(records: &[TelemetryData]) -> TelemetryData {
    match records.len() {
        0 => return TelemetryData::default(),
        1 => return records[0].clone(),
        _ => {}
    }

    let n = records.len();
    let trim = n / 10;

    let account_count = checked_narrow_u64(trimmed_mean(
        records.iter().map(|r| r.account_count).collect(),
        trim,
    ));
    let block_count =
        checked_narrow_u64(trimmed_mean(records.iter().map(|r| r.block_count).collect(), trim));
    let cemented_count = checked_narrow_u64(trimmed_mean(
        records.iter().map(|r| r.cemented_count).collect(),
        trim,
    ));
    let unchecked_count = checked_narrow_u64(trimmed_mean(
        records.iter().map(|r| r.unchecked_count).collect(),
        trim,
    ));
    let uptime =
        checked_narrow_u64(trimmed_mean(records.iter().map(|r| r.uptime).collect(), trim));
    let peer_count = checked_narrow_u32(trimmed_mean(
        records.iter().map(|r| r.peer_count as u64).collect(),
        trim,
    ));

    let timestamps: Vec<u64> = records.iter().filter_map(|r| r.timestamp).collect();
    let timestamp = if timestamps.is_empty() {
        None
    } else {
        let timestamp_trim = timestamps.len() / 10;
        Some(checked_narrow_u64(trimmed_mean(timestamps, timestamp_trim)))
    };

    let bandwidth_samples: Vec<u64> = records.iter().map(|r| r.bandwidth_cap).collect();
    let bandwidth_cap = bandwidth_cap_field(&bandwidth_samples, trim);

    let protocol_version = mode(records.iter().map(|r| r.protocol_version)).unwrap_or(0);
    let genesis_block = mode(records.iter().map(|r| r.genesis_block)).unwrap_or(Hash::ZERO);

    let version_strings: Vec<String> = records
        .iter()
        .map(|r| {
            VersionParts {
                major: r.major_version,
                minor: r.minor_version,
                patch: r.patch_version,
                pre_release: r.pre_release_version,
                maker: r.maker,
            }
            .encode()
        })
        .collect();
    let version = mode(version_strings.iter().cloned()).unwrap_or_default();
    let parts = VersionParts::decode(&version);

    TelemetryData {
        account_count,
        block_count,
        cemented_count,
        unchecked_count,
        uptime,
        bandwidth_cap,
        peer_count,
        protocol_version,
        genesis_block,
        major_version: parts.major,
        minor_version: parts.minor,
        patch_version: parts.patch,
        pre_release_version: parts.pre_release,
        maker: parts.maker,
        timestamp,
    }
}

/// `bandwidth_cap` is categorical-with-a-numeric-fallback: mode first, but only if some value
/// repeats; otherwise a trimmed mean that excludes the "unlimited" sentinel `0`.
fn bandwidth_cap_field(samples: &[u64], trim: usize) -> u64 {
    if let Some((value, count)) = mode_with_count(samples.iter().copied()) {
        if count > 1 {
            return value;
        }
    }

    let non_zero: Vec<u64> = samples.iter().copied().filter(|&v| v != 0).collect();
    if non_zero.is_empty() {
        return 0;
    }
    let trim = trim.min(non_zero.len().saturating_sub(1) / 2);
    checked_narrow_u64(trimmed_mean(non_zero, trim))
}

/// 10%-trimmed mean: sorts, drops `trim` values off each end, averages the remainder, in a wide
/// accumulator to avoid overflow. `trim` is clamped so it never empties the slice.
fn trimmed_mean(mut values: Vec<u64>, trim: usize) -> u128 {
    if values.is_empty() {
        return 0;
    }
    values.sort_unstable();
    let trim = trim.min(values.len().saturating_sub(1) / 2);
    let kept = &values[trim..values.len() - trim];
    let sum: u128 = kept.iter().map(|&v| v as u128).sum();
    sum / kept.len() as u128
}

/// The most frequent value, breaking ties in favor of whichever was observed first — this also
/// implements the "no true majority: pick the first observed" fallback used by the version-string
/// and protocol-version fields, since a field where every value is distinct ties at count 1.
fn mode<T: Eq + std::hash::Hash + Copy>(values: impl Iterator<Item = T>) -> Option<T> {
    mode_with_count(values).map(|(value, _)| value)
}

fn mode_with_count<T: Eq + std::hash::Hash + Copy>(
    values: impl Iterator<Item = T>,
) -> Option<(T, usize)> {
    let mut counts: HashMap<T, usize> = HashMap::new();
    let mut order: Vec<T> = Vec::new();
    for v in values {
        if !counts.contains_key(&v) {
            order.push(v);
        }
        *counts.entry(v).or_insert(0) += 1;
    }

    let mut best: Option<(T, usize)> = None;
    for v in order {
        let c = counts[&v];
        match best {
            Some((_, best_count)) if best_count >= c => {}
            _ => best = Some((v, c)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use tn_test_utils::telemetry;

    #[test]
    fn empty_input_is_zero_valued() {
        assert_eq!(consolidate(&[]), TelemetryData::default());
    }

    #[test]
    fn single_input_is_echoed() {
        let data = telemetry(42, 3);
        assert_eq!(consolidate(&[data.clone()]), data);
    }

    #[test]
    fn trims_ten_percent_off_each_end() {
        let records: Vec<TelemetryData> =
            (0..20u64).map(|i| TelemetryData { block_count: i, ..telemetry(0, 0) }).collect();
        let result = consolidate(&records);
        assert_eq!(result.block_count, 9);
    }

    #[test]
    fn outlier_is_trimmed_away() {
        let mut records: Vec<TelemetryData> =
            (0..10).map(|_| TelemetryData { block_count: 100, ..telemetry(0, 0) }).collect();
        records.push(TelemetryData { block_count: 1_000_000_000, ..telemetry(0, 0) });
        let result = consolidate(&records);
        assert_eq!(result.block_count, 100);
    }

    #[test]
    fn strict_majority_protocol_version_wins() {
        let mut records: Vec<TelemetryData> =
            (0..5).map(|_| TelemetryData { protocol_version: 20, ..telemetry(0, 0) }).collect();
        records.push(TelemetryData { protocol_version: 19, ..telemetry(0, 0) });
        records.push(TelemetryData { protocol_version: 21, ..telemetry(0, 0) });
        assert_eq!(consolidate(&records).protocol_version, 20);
    }

    #[test]
    fn version_round_trips_through_mode_and_decode() {
        let records: Vec<TelemetryData> = (0..3)
            .map(|_| TelemetryData {
                major_version: 26,
                minor_version: Some(1),
                patch_version: Some(0),
                pre_release_version: Some(0),
                maker: Some(2),
                ..telemetry(0, 0)
            })
            .collect();
        let result = consolidate(&records);
        assert_eq!(result.major_version, 26);
        assert_eq!(result.minor_version, Some(1));
        assert_eq!(result.maker, Some(2));
    }

    #[test]
    fn bandwidth_cap_falls_back_to_trimmed_mean_excluding_zero_when_no_mode() {
        let records: Vec<TelemetryData> = vec![
            TelemetryData { bandwidth_cap: 0, ..telemetry(0, 0) },
            TelemetryData { bandwidth_cap: 100, ..telemetry(0, 0) },
            TelemetryData { bandwidth_cap: 200, ..telemetry(0, 0) },
        ];
        let result = consolidate(&records);
        assert_eq!(result.bandwidth_cap, 150);
    }

    #[test]
    fn timestamp_only_aggregates_supplying_records() {
        let records = vec![
            TelemetryData { timestamp: Some(10), ..telemetry(0, 0) },
            TelemetryData { timestamp: None, ..telemetry(0, 0) },
            TelemetryData { timestamp: Some(20), ..telemetry(0, 0) },
        ];
        let result = consolidate(&records);
        assert_eq!(result.timestamp, Some(15));
    }
}
