//! Dictionary / fast-check (C5): bulk key trial against sectors.

use crate::error::{EngineError, EngineResult};
use crate::keytable::{Key, KeyTable, KeyType, Source};
use crate::transport::{DeviceTransport, Strategy};
use log::{info, warn};
use std::path::Path;
use std::sync::atomic::AtomicBool;

/// Common factory/default keys shipped with every MIFARE Classic toolkit;
/// tried before anything user-supplied.
pub const DEFAULT_KEYS: [Key; 9] = [
    0xFFFF_FFFF_FFFF,
    0x0000_0000_0000,
    0xA0A1_A2A3_A4A5,
    0xB0B1_B2B3_B4B5,
    0x4D3A_99C3_51DD,
    0x1A98_2C7E_459A,
    0xD3F7_D3F7_D3F7,
    0xAABB_CCDD_EEFF,
    0x71F3_D5E4_5F6A,
];

/// Parse a dictionary file: one 48-bit hex key per line, `#`-comments and
/// blank lines skipped, malformed lines warned about and skipped.
pub fn load_dictionary_file(path: &Path) -> EngineResult<Vec<Key>> {
    let text = std::fs::read_to_string(path).map_err(|_| {
        EngineError::FileError(crate::error::FileReason::NotFound)
    })?;
    Ok(parse_dictionary(&text))
}

fn parse_dictionary(text: &str) -> Vec<Key> {
    let mut keys = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match u64::from_str_radix(line, 16) {
            Ok(k) if k <= 0xFFFF_FFFF_FFFF => keys.push(k),
            _ => warn!("dictionary line {} malformed, skipping: {raw}", lineno + 1),
        }
    }
    keys
}

/// Merge a user dictionary with the built-in defaults, de-duplicating while
/// preserving first-seen order (defaults tried last since they're the most
/// commonly already-known and least sector-specific).
pub fn merged_dictionary(user: &[Key]) -> Vec<Key> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for &k in user.iter().chain(DEFAULT_KEYS.iter()) {
        if seen.insert(k) {
            out.push(k);
        }
    }
    out
}

/// Run strategy 1 (depth-first) then strategy 2 (breadth-first) fast-check
/// against every sector still missing a key, updating `table` in place and
/// returning the count of newly found keys.
pub fn run_fast_check(
    transport: &mut dyn DeviceTransport,
    table: &mut KeyTable,
    keys: &[Key],
    cancel: &AtomicBool,
) -> EngineResult<usize> {
    let mut found = 0;
    for strategy in [Strategy::DepthFirst, Strategy::BreadthFirst] {
        found += run_strategy(transport, table, keys, strategy, cancel)?;
        if !table.any_unknown() {
            break;
        }
    }
    Ok(found)
}

fn run_strategy(
    transport: &mut dyn DeviceTransport,
    table: &mut KeyTable,
    keys: &[Key],
    strategy: Strategy,
    cancel: &AtomicBool,
) -> EngineResult<usize> {
    crate::transport::abort_if_cancelled(cancel)?;
    let sector_mask: Vec<usize> = (0..table.len())
        .filter(|&s| !table.is_found(s, KeyType::A) || !table.is_found(s, KeyType::B))
        .collect();
    if sector_mask.is_empty() {
        return Ok(0);
    }
    info!("fast-check ({strategy:?}) over {} sector(s)", sector_mask.len());
    let results = transport.check_keys_fast(&sector_mask, keys, strategy)?;
    let mut found = 0;
    for (sector, a, b) in results {
        if let Some(key) = a {
            if !table.is_found(sector, KeyType::A) {
                table.set(sector, KeyType::A, key, Source::Dictionary);
                found += 1;
            }
        }
        if let Some(key) = b {
            if !table.is_found(sector, KeyType::B) {
                table.set(sector, KeyType::B, key, Source::Dictionary);
                found += 1;
            }
        }
    }
    Ok(found)
}

/// The `--legacy` fallback: an ordinary per-sector `authenticate` loop
/// instead of the device's bulk fast-check command.
pub fn run_legacy_check(
    transport: &mut dyn DeviceTransport,
    table: &mut KeyTable,
    keys: &[Key],
    cancel: &AtomicBool,
) -> EngineResult<usize> {
    let mut found = 0;
    for sector in 0..table.len() {
        crate::transport::abort_if_cancelled(cancel)?;
        let first_block = table.profile().first_block_of(sector);
        for kt in [KeyType::A, KeyType::B] {
            if table.is_found(sector, kt) {
                continue;
            }
            for &key in keys {
                if transport.authenticate(first_block, kt, key).is_ok() {
                    table.set(sector, kt, key, Source::Dictionary);
                    found += 1;
                    break;
                }
            }
        }
    }
    Ok(found)
}

/// Reuse propagation: run a single-key breadth sweep of `key` against every
/// sector/keytype not yet found, used after every successful recovery.
pub fn propagate_key(
    transport: &mut dyn DeviceTransport,
    table: &mut KeyTable,
    key: Key,
    cancel: &AtomicBool,
) -> EngineResult<usize> {
    crate::transport::abort_if_cancelled(cancel)?;
    let missing = table.missing();
    if missing.is_empty() {
        return Ok(0);
    }
    let mut found = 0;
    for (sector, kt) in missing {
        let first_block = table.profile().first_block_of(sector);
        match transport.authenticate(first_block, kt, key) {
            Ok(()) => {
                table.set(sector, kt, key, Source::Reused);
                found += 1;
            }
            Err(EngineError::AuthFail) => {}
            Err(other) => return Err(other),
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let text = "FFFFFFFFFFFF\n# comment\n\nA0A1A2A3A4A5\n";
        let keys = parse_dictionary(text);
        assert_eq!(keys, vec![0xFFFF_FFFF_FFFF, 0xA0A1_A2A3_A4A5]);
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let text = "not-hex\nFFFFFFFFFFFF\n";
        let keys = parse_dictionary(text);
        assert_eq!(keys, vec![0xFFFF_FFFF_FFFF]);
    }

    #[test]
    fn merge_dedupes_preserving_order() {
        let user = vec![0xFFFF_FFFF_FFFF, 0x1111_1111_1111];
        let merged = merged_dictionary(&user);
        assert_eq!(merged[0], 0xFFFF_FFFF_FFFF);
        assert_eq!(merged[1], 0x1111_1111_1111);
        assert_eq!(merged.iter().filter(|&&k| k == 0xFFFF_FFFF_FFFF).count(), 1);
    }
}
