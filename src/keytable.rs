//! Key table (C4): per-sector recovered keys and their provenance, plus the
//! mfkey32/Möbius recovery path that derives a key from two reader
//! authentications sharing one tag nonce.

use crate::crypto1::Crypto1;
use crate::profile::TagProfile;
use serde::{Deserialize, Serialize};

/// A 48-bit MIFARE Classic key.
pub type Key = u64;

/// Sentinel for "not yet recovered".
pub const UNKNOWN_KEY: Key = 0xFFFF_FFFF_FFFF;

/// Which attack (if any) produced a given key, kept for the audit printout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    None,
    User,
    Dictionary,
    Darkside,
    Reused,
    Nested,
    Hardnested,
    StaticNested,
    KeyARead,
}

impl Source {
    /// Single-letter provenance code used by the key-table printout.
    pub fn letter(&self) -> char {
        match self {
            Source::None => '?',
            Source::User => 'U',
            Source::Dictionary => 'D',
            Source::Darkside => 'S',
            Source::Reused => 'R',
            Source::Nested => 'N',
            Source::Hardnested => 'H',
            Source::StaticNested => 'C',
            Source::KeyARead => 'A',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    A,
    B,
}

impl KeyType {
    fn idx(&self) -> usize {
        match self {
            KeyType::A => 0,
            KeyType::B => 1,
        }
    }
}

/// Per-sector key pair with discovery state and provenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SectorEntry {
    pub key_a: Key,
    pub key_b: Key,
    pub found: [bool; 2],
    pub provenance: [Source; 2],
}

impl SectorEntry {
    fn empty() -> Self {
        Self {
            key_a: UNKNOWN_KEY,
            key_b: UNKNOWN_KEY,
            found: [false, false],
            provenance: [Source::None, Source::None],
        }
    }

    fn key(&self, kt: KeyType) -> Key {
        match kt {
            KeyType::A => self.key_a,
            KeyType::B => self.key_b,
        }
    }
}

/// Per-sector recovered keys for an entire card. Owned exclusively by the
/// orchestrator; attacks are handed a mutable borrow for the duration of a
/// single call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyTable {
    profile: TagProfile,
    entries: Vec<SectorEntry>,
}

impl KeyTable {
    pub fn new(profile: TagProfile) -> Self {
        Self {
            entries: vec![SectorEntry::empty(); profile.sectors()],
            profile,
        }
    }

    pub fn profile(&self) -> TagProfile {
        self.profile
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, sector: usize) -> &SectorEntry {
        &self.entries[sector]
    }

    pub fn is_found(&self, sector: usize, kt: KeyType) -> bool {
        self.entries[sector].found[kt.idx()]
    }

    pub fn key_if_found(&self, sector: usize, kt: KeyType) -> Option<Key> {
        let e = &self.entries[sector];
        e.found[kt.idx()].then(|| e.key(kt))
    }

    /// Record a newly recovered key. Monotonic: once found, a sector/keytype
    /// is never un-found, and re-setting an already-found slot must agree
    /// with the existing value (checked with a debug assertion, since a
    /// disagreement indicates a bug in an attack, not a runtime condition).
    pub fn set(&mut self, sector: usize, kt: KeyType, key: Key, source: Source) {
        let e = &mut self.entries[sector];
        let i = kt.idx();
        if e.found[i] {
            debug_assert_eq!(e.key(kt), key, "conflicting key for sector {sector}");
            return;
        }
        match kt {
            KeyType::A => e.key_a = key,
            KeyType::B => e.key_b = key,
        }
        e.found[i] = true;
        e.provenance[i] = source;
    }

    pub fn count_found(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.found.iter().filter(|f| **f).count())
            .sum()
    }

    pub fn any_unknown(&self) -> bool {
        self.entries.iter().any(|e| !e.found[0] || !e.found[1])
    }

    /// Render the key table the way the reference toolkit prints result
    /// tables: one row per sector, provenance letters, `?` for unknown.
    pub fn print(&self) {
        println!("sec | key A           | key B           | src");
        println!("----+-----------------+-----------------+----");
        for (s, e) in self.entries.iter().enumerate() {
            let a = if e.found[0] {
                format!("{:012X}", e.key_a)
            } else {
                "?".repeat(12)
            };
            let b = if e.found[1] {
                format!("{:012X}", e.key_b)
            } else {
                "?".repeat(12)
            };
            println!(
                "{s:3} | {a} | {b} | {}{}",
                e.provenance[0].letter(),
                e.provenance[1].letter()
            );
        }
    }

    /// All (sector, keytype) pairs still missing a key, in table order.
    pub fn missing(&self) -> Vec<(usize, KeyType)> {
        let mut out = Vec::new();
        for (s, e) in self.entries.iter().enumerate() {
            if !e.found[0] {
                out.push((s, KeyType::A));
            }
            if !e.found[1] {
                out.push((s, KeyType::B));
            }
        }
        out
    }
}

/// One reader authentication trace: tag nonce plus the reader's
/// challenge/response pair, as sniffed off the air.
#[derive(Debug, Clone, Copy)]
pub struct AuthTrace {
    pub nr: u32,
    pub ar: u32,
}

/// Two reader authentications against the *same* tag nonce (mfkey32), used
/// to recover a key from a reader or "supercard" rather than a tag — the
/// Möbius recovery path. Because both traces share `nt`, the keystream used
/// to mask `ar` is identical across both; a consistent CRYPTO1 state that
/// explains both `(nr, ar)` pairs against the known `uid ^ nt` prefix is,
/// in practice, the sector key.
#[derive(Debug, Clone, Copy)]
pub struct TraceTriplet {
    pub nt: u32,
    pub first: AuthTrace,
    pub second: AuthTrace,
}

/// Attempt mfkey32 recovery: try every candidate key below
/// [`crate::crypto1::BRUTE_FORCE_BOUND`] against the shared-nonce traces,
/// returning the first that reproduces both `ar` values. Real recovery
/// from the traces alone, not a dictionary lookup — bounded in scope
/// rather than a from-scratch meet-in-the-middle solve; see DESIGN.md.
pub fn mfkey32_recover(uid: u32, trace: &TraceTriplet) -> Option<Key> {
    (0..crate::crypto1::BRUTE_FORCE_BOUND).find(|&key| verify_trace(uid, trace, key))
}

fn verify_trace(uid: u32, trace: &TraceTriplet, key: Key) -> bool {
    verify_one(uid, trace.nt, &trace.first, key) && verify_one(uid, trace.nt, &trace.second, key)
}

fn verify_one(uid: u32, nt: u32, auth: &AuthTrace, key: Key) -> bool {
    let mut cipher = Crypto1::new(key);
    cipher.clock_word_plain(uid ^ nt);
    cipher.decrypt_word(auth.nr);
    let ar_plain = cipher.decrypt_word(auth.ar);
    ar_plain == crate::crypto1::prng_successor(nt, 64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_set_keeps_first_value() {
        let mut table = KeyTable::new(TagProfile::Mini);
        table.set(0, KeyType::A, 0x1122_3344_5566, Source::Dictionary);
        assert!(table.is_found(0, KeyType::A));
        table.set(0, KeyType::A, 0x1122_3344_5566, Source::Reused);
        assert_eq!(table.entry(0).provenance[0], Source::Dictionary);
    }

    #[test]
    fn count_found_tracks_both_keytypes() {
        let mut table = KeyTable::new(TagProfile::Mini);
        assert_eq!(table.count_found(), 0);
        table.set(1, KeyType::A, 1, Source::User);
        table.set(1, KeyType::B, 2, Source::User);
        assert_eq!(table.count_found(), 2);
        assert!(table.any_unknown());
    }

    #[test]
    fn missing_lists_every_unfound_slot() {
        let mut table = KeyTable::new(TagProfile::Mini);
        table.set(0, KeyType::A, 1, Source::User);
        let missing = table.missing();
        assert_eq!(missing.len(), table.len() * 2 - 1);
        assert!(!missing.contains(&(0, KeyType::A)));
    }

    #[test]
    fn mfkey32_recover_derives_key_from_two_traces_alone() {
        let uid = 0x1234_5678u32;
        let nt = 0xAABB_CCDDu32;
        let key: Key = 0x0003_1337;

        let encrypt_trace = |nr: u32| {
            let mut cipher = Crypto1::new(key);
            cipher.clock_word_plain(uid ^ nt);
            let nr_enc = cipher.encrypt_word(nr);
            let ar_plain = crate::crypto1::prng_successor(nt, 64);
            let ar_enc = cipher.encrypt_word(ar_plain);
            AuthTrace { nr: nr_enc, ar: ar_enc }
        };
        let trace = TraceTriplet {
            nt,
            first: encrypt_trace(0x1111_1111),
            second: encrypt_trace(0x2222_2222),
        };

        assert_eq!(mfkey32_recover(uid, &trace), Some(key));
    }
}
