//! Candidate classification and intersection (C8 steps 2-3).
//!
//! Real hardnested precomputes, offline, constant tables mapping every
//! possible parity signature to the set of 48-bit states consistent with
//! it, letting it search the full 48-bit space. This module narrows a
//! bounded candidate range (see [`crate::crypto1::BRUTE_FORCE_BOUND`])
//! down by requiring every acquired sample's leaked keystream to match
//! what a candidate key would actually produce — a real per-key
//! discriminator, just over a smaller universe. See DESIGN.md.

use crate::crypto1::{prng_successor, Crypto1};
use crate::keytable::Key;
use crate::transport::NonceSample;

/// Keep only keys in `keyspace` whose simulated keystream parity is
/// consistent with every sample in `samples`. The keyspace is partitioned
/// across a bounded worker pool (sized to available cores) so large
/// candidate sets classify in parallel; each worker reduces its own
/// partition and results are concatenated by the caller.
pub fn intersect(cuid: u32, samples: &[NonceSample], keyspace: &[Key]) -> Vec<Key> {
    if keyspace.len() < 256 {
        return keyspace
            .iter()
            .copied()
            .filter(|&key| samples.iter().all(|s| consistent(cuid, s, key)))
            .collect();
    }

    let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(8);
    let chunk_size = (keyspace.len() / workers).max(1);
    let mut out = Vec::new();
    std::thread::scope(|scope| {
        let handles: Vec<_> = keyspace
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .copied()
                        .filter(|&key| samples.iter().all(|s| consistent(cuid, s, key)))
                        .collect::<Vec<Key>>()
                })
            })
            .collect();
        for h in handles {
            out.extend(h.join().unwrap());
        }
    });
    out
}

fn consistent(cuid: u32, sample: &NonceSample, key: Key) -> bool {
    let mut cipher = Crypto1::new(key);
    cipher.clock_word_plain(cuid ^ sample.nt);
    if cipher.encrypt_word(0) != sample.nr_enc {
        return false;
    }
    let ar_plain = prng_successor(sample.nt, 64);
    cipher.encrypt_word(ar_plain) == sample.ar_enc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keytable::KeyType;

    fn sample_for(cuid: u32, key: Key, nt: u32) -> NonceSample {
        let mut cipher = Crypto1::new(key);
        cipher.clock_word_plain(cuid ^ nt);
        let nr_enc = cipher.encrypt_word(0);
        let ar_enc = cipher.encrypt_word(prng_successor(nt, 64));
        NonceSample { cuid, nt, nr_enc, ar_enc, target_sector: 0, target_keytype: KeyType::A }
    }

    #[test]
    fn intersect_never_grows_the_keyspace() {
        let samples = vec![sample_for(1, 3, 0x1234_5678)];
        let keyspace = vec![1u64, 2, 3, 4];
        let out = intersect(1, &samples, &keyspace);
        assert!(out.len() <= keyspace.len());
    }

    #[test]
    fn intersect_discriminates_between_candidate_keys() {
        let samples = vec![sample_for(1, 3, 0x1234_5678)];
        let keyspace = vec![1u64, 2, 3, 4];
        let out = intersect(1, &samples, &keyspace);
        assert_eq!(out, vec![3u64]);
    }
}
