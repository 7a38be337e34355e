//! Device transport (C2): the boundary between the cryptanalytic core and
//! the raw ISO/IEC 14443-A transceiver. The core only ever talks to the
//! `DeviceTransport` trait; a real reader and a `MockTransport` used by this
//! crate's own tests are equally valid implementations.

use crate::error::{EngineError, EngineResult};
use crate::keytable::{Key, KeyType};

/// UID/SAK/ATQA returned by anticollision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardId {
    pub uid: Vec<u8>,
    pub sak: u8,
    pub atqa: [u8; 2],
}

impl CardId {
    /// UID folded into a 32-bit value the way CRYPTO1 authentication uses
    /// it (`uid ^ nt` for single-size UIDs; cascade UIDs use the last four
    /// bytes of the reported UID per ISO14443-A cascade level 2/3 rules).
    pub fn uid32(&self) -> u32 {
        let n = self.uid.len();
        let tail = &self.uid[n.saturating_sub(4)..];
        u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]])
    }
}

/// Weak-PRNG dictionary/fast-check strategy (C5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Try every key against sector 0 before moving to the next sector.
    DepthFirst,
    /// Try each key once across every remaining sector.
    BreadthFirst,
}

/// PRNG classification, probed once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrngStatic {
    Static,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrngWeak {
    Weak,
    Hardened,
}

/// One observed nonce/keystream sample during nested/hardnested
/// acquisition. `nt` is the tag nonce, sent in the clear per the real
/// protocol. `nr_enc` and `ar_enc` are the encrypted reader challenge and
/// tag response from a nested authentication attempt where the reader
/// deliberately sends `nr = 0`, so `nr_enc` is the raw keystream word and
/// `ar_enc` leaks the following keystream word against the known
/// `suc64(nt)` plaintext — together enough to recover the sector key
/// without already knowing it (see [`crate::crypto1::recover_key`]).
#[derive(Debug, Clone, Copy)]
pub struct NonceSample {
    pub cuid: u32,
    pub nt: u32,
    pub nr_enc: u32,
    pub ar_enc: u32,
    pub target_sector: usize,
    pub target_keytype: KeyType,
}

/// Request/response boundary to the contactless transceiver. All calls are
/// synchronous with an implementation-defined timeout; exactly one call is
/// ever in flight.
pub trait DeviceTransport {
    fn select(&mut self) -> EngineResult<CardId>;

    fn authenticate(&mut self, block: usize, kt: KeyType, key: Key) -> EngineResult<()>;

    fn read_block(&mut self, block: usize, kt: KeyType, key: Key) -> EngineResult<[u8; 16]>;

    fn write_block(&mut self, block: usize, kt: KeyType, key: Key, data: [u8; 16]) -> EngineResult<()>;

    /// Streaming bulk key trial. Returns, per sector in `sector_mask`, the
    /// keys found for A and B (`None` if not found in this chunk range).
    fn check_keys_fast(
        &mut self,
        sector_mask: &[usize],
        keys: &[Key],
        strategy: Strategy,
    ) -> EngineResult<Vec<(usize, Option<Key>, Option<Key>)>>;

    /// Harvest `count` encrypted-nonce samples while authenticated to
    /// `known_block` with `known_key`, immediately nested-authenticating to
    /// `target_block`.
    fn acquire_nonces(
        &mut self,
        known_block: usize,
        known_kt: KeyType,
        known_key: Key,
        target_block: usize,
        target_kt: KeyType,
        count: usize,
        slow: bool,
    ) -> EngineResult<Vec<NonceSample>>;

    fn emulator_get_mem(&mut self, block: usize) -> EngineResult<[u8; 16]>;
    fn emulator_set_mem(&mut self, block: usize, data: [u8; 16]) -> EngineResult<()>;
    fn emulator_fill_from_card(&mut self, sector_count: usize, kt: KeyType) -> EngineResult<()>;

    fn detect_prng_static(&mut self) -> EngineResult<PrngStatic>;
    fn detect_prng_weak(&mut self) -> EngineResult<PrngWeak>;

    /// Darkside raw primitive: attempt an authentication with a
    /// deliberately-wrong key and report whether the tag NACKed, along with
    /// the nonce and keystream-parity bits the NACK leaked.
    fn darkside_step(&mut self, block: usize) -> EngineResult<DarksideSample>;
}

/// One round of the darkside attack: the tag nonce for this attempt and the
/// single parity bit the NACK timing/response leaked about the keystream.
#[derive(Debug, Clone, Copy)]
pub struct DarksideSample {
    pub nt: u32,
    pub ks_parity_bit: u8,
    pub nacked: bool,
}

pub(crate) fn abort_if_cancelled(cancel: &std::sync::atomic::AtomicBool) -> EngineResult<()> {
    if cancel.load(std::sync::atomic::Ordering::SeqCst) {
        Err(EngineError::UserAbort)
    } else {
        Ok(())
    }
}

pub mod mock;
pub use mock::MockTransport;
