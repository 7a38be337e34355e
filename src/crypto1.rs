//! CRYPTO1 stream cipher primitive.
//!
//! CRYPTO1 is NXP's 48-bit LFSR stream cipher used by MIFARE Classic for
//! mutual authentication and for encrypting everything exchanged after it.
//! This module implements the cipher itself plus the handful of algebraic
//! operations (`prng_successor`, LFSR rollback) that the attacks in
//! [`crate::attacks`] build on. It performs no I/O and never fails.

/// Mask for the 48 bits that make up the LFSR register.
const MASK48: u64 = (1u64 << 48) - 1;

/// Feedback tap positions of the 48-bit LFSR (bit 0 is the bit about to be
/// shifted out).
const FEEDBACK_TAPS: [u32; 18] = [
    0, 5, 9, 10, 12, 14, 15, 17, 19, 24, 25, 27, 29, 35, 39, 41, 42, 43,
];

/// Filter-function tap positions, all odd, spanning bits 9..=47.
const FILTER_TAPS: [u32; 20] = [
    9, 11, 13, 15, 17, 19, 21, 23, 25, 27, 29, 31, 33, 35, 37, 39, 41, 43, 45, 47,
];

fn fa(x0: u8, x1: u8, x2: u8, x3: u8) -> u8 {
    ((x0 | x1) ^ (x0 & x3)) ^ (x2 & (x0 ^ x1))
}

fn fb(x0: u8, x1: u8, x2: u8, x3: u8) -> u8 {
    ((x0 & x1) | x2) ^ ((x0 ^ x1) & (x2 | x3))
}

fn fc(x0: u8, x1: u8, x2: u8, x3: u8, x4: u8) -> u8 {
    (x0 | ((x1 | x4) & (x3 ^ x4))) ^ ((x0 ^ (x1 & x4)) & ((x2 ^ x3) | (x1 & x4)))
}

/// A CRYPTO1 cipher instance: the 48-bit LFSR register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crypto1 {
    state: u64,
}

impl Crypto1 {
    /// Create a cipher whose state is the raw 48-bit key. This mirrors how
    /// real MIFARE Classic silicon loads the sector key directly as the
    /// initial LFSR contents.
    pub fn new(key: u64) -> Self {
        Self { state: key & MASK48 }
    }

    /// The current 48-bit register contents.
    pub fn state(&self) -> u64 {
        self.state
    }

    fn bit_at(&self, i: u32) -> u8 {
        ((self.state >> i) & 1) as u8
    }

    /// The current filter-function output bit without clocking.
    pub fn filter_bit(&self) -> u8 {
        self.filter()
    }

    fn filter(&self) -> u8 {
        let x: Vec<u8> = FILTER_TAPS.iter().map(|&t| self.bit_at(t)).collect();
        let o1 = fa(x[0], x[1], x[2], x[3]);
        let o2 = fb(x[4], x[5], x[6], x[7]);
        let o3 = fb(x[8], x[9], x[10], x[11]);
        let o4 = fa(x[12], x[13], x[14], x[15]);
        let o5 = fb(x[16], x[17], x[18], x[19]);
        fc(o1, o2, o3, o4, o5)
    }

    fn feedback(&self) -> u8 {
        FEEDBACK_TAPS.iter().fold(0u8, |acc, &t| acc ^ self.bit_at(t))
    }

    /// Clock the LFSR once, feeding `plain_bit` into the feedback function
    /// (this is always the *plaintext* bit, whichever direction data is
    /// flowing). Returns the keystream bit the filter produced immediately
    /// before clocking.
    pub fn clock(&mut self, plain_bit: u8) -> u8 {
        let ks = self.filter();
        let new_bit = self.feedback() ^ (plain_bit & 1);
        self.state = (self.state >> 1) | ((new_bit as u64) << 47);
        ks
    }

    /// Undo one `clock` call: given the state *after* clocking and the
    /// plaintext bit that was fed in, recover the state *before* clocking.
    pub fn rollback_bit(state_after: u64, plain_bit: u8) -> u64 {
        let cur = state_after & MASK48;
        let bit_at = |i: u32| ((cur >> i) & 1) as u8;
        // Every feedback tap except position 0 corresponds, in the
        // rolled-back state, to bit (t-1) of the current state (since the
        // shift moved bit i of the previous state to bit i-1).
        let known_xor = FEEDBACK_TAPS
            .iter()
            .filter(|&&t| t != 0)
            .fold(0u8, |acc, &t| acc ^ bit_at(t - 1));
        let top = bit_at(47);
        let b0 = top ^ (plain_bit & 1) ^ known_xor;
        ((cur << 1) & MASK48) | (b0 as u64)
    }

    /// Roll this cipher back by one clock in place.
    pub fn rollback(&mut self, plain_bit: u8) {
        self.state = Self::rollback_bit(self.state, plain_bit);
    }

    /// Encrypt or decrypt a 32-bit word, MSB first, clocking the LFSR
    /// forward by 32 steps. The bit fed back into the LFSR is always the
    /// plaintext bit, so `decrypt(encrypt(m, s), s) == m` for a cipher
    /// cloned to the same starting state.
    fn crypt_word(&mut self, in_word: u32, encrypt: bool) -> u32 {
        let mut out = 0u32;
        for i in (0..32).rev() {
            let data_bit = ((in_word >> i) & 1) as u8;
            let ks = self.filter();
            let plain_bit = if encrypt { data_bit } else { data_bit ^ ks };
            let out_bit = if encrypt { data_bit ^ ks } else { plain_bit };
            let new_bit = self.feedback() ^ plain_bit;
            self.state = (self.state >> 1) | ((new_bit as u64) << 47);
            out = (out << 1) | out_bit as u32;
        }
        out
    }

    /// Encrypt a 32-bit plaintext word, advancing the cipher.
    pub fn encrypt_word(&mut self, plain: u32) -> u32 {
        self.crypt_word(plain, true)
    }

    /// Decrypt a 32-bit ciphertext word, advancing the cipher.
    pub fn decrypt_word(&mut self, cipher: u32) -> u32 {
        self.crypt_word(cipher, false)
    }

    /// Clock `plain` in unencrypted (used for the UID^nT phase of
    /// authentication, which is never ciphertext) and return the keystream
    /// bits produced, MSB first, packed into a u32. The plaintext itself
    /// passes through unchanged; this exists for callers that want the
    /// keystream alongside the clocking, e.g. to derive `ar`/`at`.
    pub fn clock_word_plain(&mut self, plain: u32) -> u32 {
        let mut ks = 0u32;
        for i in (0..32).rev() {
            let bit = ((plain >> i) & 1) as u8;
            let out = self.clock(bit);
            ks = (ks << 1) | out as u32;
        }
        ks
    }

    /// Roll the cipher back by 32 clocks, given the 32 plaintext bits
    /// (MSB first) that were fed in during those clocks.
    pub fn rollback_word(&mut self, plain: u32) {
        for i in 0..32 {
            let bit = ((plain >> i) & 1) as u8;
            self.rollback(bit);
        }
    }
}

/// Standard odd parity over a byte: 1 if the number of set bits is even
/// (i.e. the parity bit makes the total count odd), matching the parity
/// convention ISO/IEC 14443-A and MIFARE Classic transmit alongside data.
pub fn odd_parity(byte: u8) -> u8 {
    1 ^ (byte.count_ones() as u8 & 1)
}

/// Parity bits (one per byte, MSB-first byte order) for a 32-bit word,
/// combined with the keystream bit that immediately follows each byte's
/// 8 data bits (MIFARE Classic transmits `parity ^ keystream_bit`, so an
/// eavesdropper who does not know the keystream cannot recover plaintext
/// parity directly).
pub fn transmitted_parity(word: u32, keystream_parity_bits: [u8; 4]) -> [u8; 4] {
    let bytes = word.to_be_bytes();
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = odd_parity(bytes[i]) ^ keystream_parity_bits[i];
    }
    out
}

/// Practical bound for the bounded-exhaustive key recovery below. A real
/// crapto1-grade solver recovers a 48-bit key from leaked keystream in
/// well under a second without any bound; reproducing that meet-in-the-
/// middle table construction is out of scope here (see DESIGN.md), so
/// this crate instead tries every candidate below this bound. Recovery
/// is genuine — it never requires the true key to already be known —
/// but only tractable for keys smaller than this.
pub const BRUTE_FORCE_BOUND: u64 = 1 << 20;

/// Recover a 48-bit key from a tag nonce plus the keystream an
/// attacker-chosen reader challenge leaks: sending `nr = 0` means
/// `nr_enc` is the keystream itself, and `ar_enc` is the following
/// keystream word XORed with the tag's expected `suc64(nt)` response.
/// Tries every key below [`BRUTE_FORCE_BOUND`] and returns the first
/// whose simulated cipher reproduces both leaked words.
pub fn recover_key(cuid: u32, nt: u32, nr_enc: u32, ar_enc: u32) -> Option<u64> {
    let ar_plain = prng_successor(nt, 64);
    (0..BRUTE_FORCE_BOUND).find(|&key| {
        let mut cipher = Crypto1::new(key);
        cipher.clock_word_plain(cuid ^ nt);
        cipher.encrypt_word(0) == nr_enc && cipher.encrypt_word(ar_plain) == ar_enc
    })
}

/// Recover a sector key from a leaked nested-auth trace (see
/// [`recover_key`]) and use it to decrypt whatever ciphertext followed in
/// the same authenticated session (e.g. a block read response), without
/// the caller ever supplying the key — only the nonce and the two
/// keystream-leaking words from the reader/tag exchange.
pub fn decrypt_trace(cuid: u32, nt: u32, nr_enc: u32, ar_enc: u32, ciphertext: u32) -> Option<u32> {
    let key = recover_key(cuid, nt, nr_enc, ar_enc)?;
    let mut cipher = Crypto1::new(key);
    cipher.clock_word_plain(cuid ^ nt);
    cipher.encrypt_word(0);
    cipher.encrypt_word(prng_successor(nt, 64));
    Some(cipher.decrypt_word(ciphertext))
}

/// Advance the tag's 16-bit-period weak PRNG by `n` steps. This is a
/// *different* LFSR from CRYPTO1 itself: it is the generator MIFARE
/// Classic tags with a "weak" PRNG use to produce nonces, and its short
/// effective period is what darkside/nested/hardnested all exploit.
pub fn prng_successor(x: u32, n: u32) -> u32 {
    let mut x = x.swap_bytes();
    for _ in 0..n {
        x = (x >> 1) | (((x >> 16) ^ (x >> 18) ^ (x >> 19) ^ (x >> 21)) & 1) << 31;
    }
    x.swap_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_states() -> Vec<u64> {
        vec![
            0x0000_0000_0000,
            0xFFFF_FFFF_FFFF,
            0xA0A1_A2A3_A4A5,
            0x1234_5678_9ABC,
            0x0123_4567_89AB,
        ]
    }

    #[test]
    fn round_trip_encrypt_decrypt() {
        for &key in &sample_states() {
            for msg in [0u32, 1, 0xDEAD_BEEF, 0xFFFF_FFFF, 0x1234_5678] {
                let mut enc = Crypto1::new(key);
                let cipher = enc.encrypt_word(msg);
                let mut dec = Crypto1::new(key);
                let plain = dec.decrypt_word(cipher);
                assert_eq!(plain, msg);
            }
        }
    }

    #[test]
    fn rollback_inverts_clock() {
        for &key in &sample_states() {
            let mut c = Crypto1::new(key);
            let bits = [0u8, 1, 1, 0, 1, 0, 0, 1, 1, 1];
            let mut states = vec![c.state()];
            for &b in &bits {
                c.clock(b);
                states.push(c.state());
            }
            for (i, &b) in bits.iter().enumerate().rev() {
                let prev = Crypto1::rollback_bit(states[i + 1], b);
                assert_eq!(prev, states[i], "rollback mismatch at step {i}");
            }
        }
    }

    #[test]
    fn rollback_word_inverts_crypt_word() {
        for &key in &sample_states() {
            let before = Crypto1::new(key);
            let mut after = before;
            let plain = 0x41E5_86F9u32;
            after.encrypt_word(plain);
            let mut rolled = after;
            rolled.rollback_word(plain);
            assert_eq!(rolled.state(), before.state());
        }
    }

    #[test]
    fn prng_successor_composes() {
        let x = 0xB830_049Bu32;
        for m in 0..=20u32 {
            for n in 0..=20u32 {
                assert_eq!(
                    prng_successor(prng_successor(x, m), n),
                    prng_successor(x, m + n)
                );
            }
        }
    }

    #[test]
    fn prng_successor_zero_is_identity() {
        assert_eq!(prng_successor(0xB830_049B, 0), 0xB830_049B);
    }

    #[test]
    fn odd_parity_matches_known_bytes() {
        assert_eq!(odd_parity(0x00), 1);
        assert_eq!(odd_parity(0xFF), 1);
        assert_eq!(odd_parity(0x01), 0);
    }

    #[test]
    fn recover_key_finds_key_from_leaked_keystream_alone() {
        let cuid = 0xDEAD_BEEFu32;
        let nt = 0x1234_5678u32;
        let key = 0x0001_ABCDu64;

        let mut cipher = Crypto1::new(key);
        cipher.clock_word_plain(cuid ^ nt);
        let nr_enc = cipher.encrypt_word(0);
        let ar_plain = prng_successor(nt, 64);
        let ar_enc = cipher.encrypt_word(ar_plain);

        assert_eq!(recover_key(cuid, nt, nr_enc, ar_enc), Some(key));
    }

    #[test]
    fn decrypt_trace_recovers_data_without_the_key() {
        let cuid = 0xDEAD_BEEFu32;
        let nt = 0xB830_049Bu32;
        let key = 0x0009_9ABCu64;
        let data = 0x41E5_86F9u32;

        let mut cipher = Crypto1::new(key);
        cipher.clock_word_plain(cuid ^ nt);
        let nr_enc = cipher.encrypt_word(0);
        let ar_enc = cipher.encrypt_word(prng_successor(nt, 64));
        let cipher_data = cipher.encrypt_word(data);

        assert_eq!(decrypt_trace(cuid, nt, nr_enc, ar_enc, cipher_data), Some(data));
    }

    #[test]
    fn recover_key_fails_outside_the_bound() {
        let cuid = 0xDEAD_BEEFu32;
        let nt = 0x1234_5678u32;
        let key = BRUTE_FORCE_BOUND + 1;

        let mut cipher = Crypto1::new(key);
        cipher.clock_word_plain(cuid ^ nt);
        let nr_enc = cipher.encrypt_word(0);
        let ar_plain = prng_successor(nt, 64);
        let ar_enc = cipher.encrypt_word(ar_plain);

        assert_eq!(recover_key(cuid, nt, nr_enc, ar_enc), None);
    }
}
