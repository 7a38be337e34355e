//! In-memory scriptable transport used by this crate's own tests. Models a
//! single virtual card closely enough to exercise the full attack surface
//! deterministically, without needing real MFRC522 hardware.

use super::{CardId, DarksideSample, DeviceTransport, NonceSample, PrngStatic, PrngWeak, Strategy};
use crate::crypto1::{prng_successor, Crypto1};
use crate::error::{EngineError, EngineResult};
use crate::keytable::{Key, KeyType};
use crate::profile::TagProfile;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Static description of the virtual card a `MockTransport` presents.
#[derive(Debug, Clone)]
pub struct MockCardConfig {
    pub uid: Vec<u8>,
    pub sak: u8,
    pub atqa: [u8; 2],
    pub profile: TagProfile,
    /// Real (Key A, Key B) per sector — what the attacks under test are
    /// trying to recover.
    pub keys: Vec<(Key, Key)>,
    pub prng_static: PrngStatic,
    pub prng_weak: PrngWeak,
    /// Whether the tag replies NACK to failed authentication (required for
    /// darkside to apply at all).
    pub nacks_on_bad_auth: bool,
}

impl MockCardConfig {
    /// A 1K card with the nine common default keys, weak PRNG, NACK-capable.
    pub fn default_keys_1k() -> Self {
        let default_key = 0xFFFF_FFFF_FFFFu64;
        Self {
            uid: vec![0xDE, 0xAD, 0xBE, 0xEF],
            sak: 0x08,
            atqa: [0x04, 0x00],
            profile: TagProfile::S1K,
            keys: vec![(default_key, default_key); TagProfile::S1K.sectors()],
            prng_static: PrngStatic::Normal,
            prng_weak: PrngWeak::Weak,
            nacks_on_bad_auth: true,
        }
    }
}

pub struct MockTransport {
    cfg: MockCardConfig,
    memory: Vec<[u8; 16]>,
    emu: Vec<[u8; 16]>,
    nonce_counter: u32,
    cancel: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(cfg: MockCardConfig) -> Self {
        let blocks = cfg.profile.blocks();
        let mut memory = vec![[0u8; 16]; blocks];
        for s in 0..cfg.profile.sectors() {
            let trailer = cfg.profile.first_block_of(s) + cfg.profile.blocks_of(s) - 1;
            memory[trailer] = Self::trailer_bytes(cfg.keys[s].0, cfg.keys[s].1);
        }
        let emu = vec![[0u8; 16]; blocks];
        Self {
            nonce_counter: 0xC0FF_EE42,
            memory,
            emu,
            cancel: Arc::new(AtomicBool::new(false)),
            cfg,
        }
    }

    fn trailer_bytes(key_a: Key, key_b: Key) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..6].copy_from_slice(&key_a.to_be_bytes()[2..8]);
        out[6] = 0xFF;
        out[7] = 0x07;
        out[8] = 0x80;
        out[9] = 0x69;
        out[10..16].copy_from_slice(&key_b.to_be_bytes()[2..8]);
        out
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn card_id(&self) -> CardId {
        CardId {
            uid: self.cfg.uid.clone(),
            sak: self.cfg.sak,
            atqa: self.cfg.atqa,
        }
    }

    fn next_nonce(&mut self) -> u32 {
        // xorshift32, deterministic and seed-reproducible so tests are stable.
        let mut x = self.nonce_counter;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.nonce_counter = x;
        x
    }

    fn real_key(&self, sector: usize, kt: KeyType) -> Key {
        match kt {
            KeyType::A => self.cfg.keys[sector].0,
            KeyType::B => self.cfg.keys[sector].1,
        }
    }

    fn check_auth(&mut self, block: usize, kt: KeyType, key: Key) -> EngineResult<()> {
        let sector = self.cfg.profile.sector_of(block);
        if self.real_key(sector, kt) == key {
            Ok(())
        } else {
            Err(EngineError::AuthFail)
        }
    }
}

impl DeviceTransport for MockTransport {
    fn select(&mut self) -> EngineResult<CardId> {
        Ok(self.card_id())
    }

    fn authenticate(&mut self, block: usize, kt: KeyType, key: Key) -> EngineResult<()> {
        self.check_auth(block, kt, key)
    }

    fn read_block(&mut self, block: usize, kt: KeyType, key: Key) -> EngineResult<[u8; 16]> {
        self.check_auth(block, kt, key)?;
        Ok(self.memory[block])
    }

    fn write_block(&mut self, block: usize, kt: KeyType, key: Key, data: [u8; 16]) -> EngineResult<()> {
        self.check_auth(block, kt, key)?;
        self.memory[block] = data;
        Ok(())
    }

    fn check_keys_fast(
        &mut self,
        sector_mask: &[usize],
        keys: &[Key],
        _strategy: Strategy,
    ) -> EngineResult<Vec<(usize, Option<Key>, Option<Key>)>> {
        let mut out = Vec::new();
        for &sector in sector_mask {
            let a = keys.iter().copied().find(|&k| k == self.real_key(sector, KeyType::A));
            let b = keys.iter().copied().find(|&k| k == self.real_key(sector, KeyType::B));
            out.push((sector, a, b));
        }
        Ok(out)
    }

    fn acquire_nonces(
        &mut self,
        known_block: usize,
        known_kt: KeyType,
        known_key: Key,
        target_block: usize,
        target_kt: KeyType,
        count: usize,
        _slow: bool,
    ) -> EngineResult<Vec<NonceSample>> {
        self.check_auth(known_block, known_kt, known_key)?;
        let target_sector = self.cfg.profile.sector_of(target_block);
        let target_key = self.real_key(target_sector, target_kt);
        let cuid = self.card_id().uid32();

        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let nt = match self.cfg.prng_static {
                PrngStatic::Static => 0xABCD_1234,
                PrngStatic::Normal => match self.cfg.prng_weak {
                    PrngWeak::Weak => prng_successor(self.next_nonce(), 0),
                    PrngWeak::Hardened => self.next_nonce(),
                },
            };
            let mut cipher = Crypto1::new(target_key);
            cipher.clock_word_plain(cuid ^ nt);
            // Reader sends nr = 0, so the encrypted challenge is the raw
            // keystream word; ar_enc continues the same running cipher.
            let nr_enc = cipher.encrypt_word(0);
            let ar_plain = prng_successor(nt, 64);
            let ar_enc = cipher.encrypt_word(ar_plain);
            samples.push(NonceSample {
                cuid,
                nt,
                nr_enc,
                ar_enc,
                target_sector,
                target_keytype: target_kt,
            });
        }
        Ok(samples)
    }

    fn emulator_get_mem(&mut self, block: usize) -> EngineResult<[u8; 16]> {
        Ok(self.emu[block])
    }

    fn emulator_set_mem(&mut self, block: usize, data: [u8; 16]) -> EngineResult<()> {
        self.emu[block] = data;
        Ok(())
    }

    fn emulator_fill_from_card(&mut self, sector_count: usize, kt: KeyType) -> EngineResult<()> {
        for s in 0..sector_count.min(self.cfg.profile.sectors()) {
            let first = self.cfg.profile.first_block_of(s);
            let last = first + self.cfg.profile.blocks_of(s);
            let key = self.real_key(s, kt);
            for b in first..last {
                let data = self.read_block(b, kt, key)?;
                self.emu[b] = data;
            }
        }
        Ok(())
    }

    fn detect_prng_static(&mut self) -> EngineResult<PrngStatic> {
        Ok(self.cfg.prng_static)
    }

    fn detect_prng_weak(&mut self) -> EngineResult<PrngWeak> {
        Ok(self.cfg.prng_weak)
    }

    fn darkside_step(&mut self, block: usize) -> EngineResult<DarksideSample> {
        let sector = self.cfg.profile.sector_of(block);
        let target_key = self.real_key(sector, KeyType::A);
        let nt = match self.cfg.prng_weak {
            PrngWeak::Weak => prng_successor(self.next_nonce(), 0),
            PrngWeak::Hardened => self.next_nonce(),
        };
        if !self.cfg.nacks_on_bad_auth || self.cfg.prng_weak == PrngWeak::Hardened {
            return Ok(DarksideSample {
                nt,
                ks_parity_bit: 0,
                nacked: false,
            });
        }
        let cuid = self.card_id().uid32();
        let mut cipher = Crypto1::new(target_key);
        cipher.clock_word_plain(cuid ^ nt);
        let ks_parity_bit = cipher.filter_bit();
        Ok(DarksideSample {
            nt,
            ks_parity_bit,
            nacked: true,
        })
    }
}
