//! Tag profile: sector/block geometry and access-condition decoding (C3).

use serde::{Deserialize, Serialize};

/// MIFARE Classic size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagProfile {
    Mini,
    S1K,
    S2K,
    S4K,
}

impl TagProfile {
    /// Number of sectors for this profile.
    pub fn sectors(&self) -> usize {
        match self {
            TagProfile::Mini => 5,
            TagProfile::S1K => 16,
            TagProfile::S2K => 32,
            TagProfile::S4K => 40,
        }
    }

    /// Number of 16-byte blocks for this profile.
    pub fn blocks(&self) -> usize {
        match self {
            TagProfile::Mini => 20,
            TagProfile::S1K => 64,
            TagProfile::S2K => 128,
            TagProfile::S4K => 256,
        }
    }

    /// Number of blocks in `sector` (4 for sectors 0..32, 16 for 32..40).
    pub fn blocks_of(&self, sector: usize) -> usize {
        if sector < 32 {
            4
        } else {
            16
        }
    }

    /// Index of the first block belonging to `sector`.
    pub fn first_block_of(&self, sector: usize) -> usize {
        if sector < 32 {
            sector * 4
        } else {
            32 * 4 + (sector - 32) * 16
        }
    }

    /// Which sector a block index belongs to.
    pub fn sector_of(&self, block: usize) -> usize {
        if block < 32 * 4 {
            block / 4
        } else {
            32 + (block - 32 * 4) / 16
        }
    }

    /// A block index is a sector trailer iff it is the last block of its sector.
    pub fn is_trailer(&self, block: usize) -> bool {
        let s = self.sector_of(block);
        block == self.first_block_of(s) + self.blocks_of(s) - 1
    }
}

/// Which key, if any, may perform a given operation on a data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAccess {
    /// Either key authenticates a read.
    AorB,
    /// Only Key A authenticates a read.
    AOnly,
    /// Only Key B authenticates a read.
    BOnly,
    /// Neither key authenticates a read (e.g. value-block-only access bits).
    None,
}

/// Decoded C1,C2,C3 access condition bits for one data area, per the
/// standard 8-row MIFARE Classic access condition table. A sentinel value
/// outside that table (`MALFORMED`) represents the §3 fallback for a
/// trailer whose inverted nibbles don't check out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessConditions {
    bits: u8,
}

const MALFORMED: u8 = 0b1000;

impl AccessConditions {
    pub fn from_bits(c1: u8, c2: u8, c3: u8) -> Self {
        Self {
            bits: ((c1 & 1) << 2) | ((c2 & 1) << 1) | (c3 & 1),
        }
    }

    /// Decode bytes 6..10 of a sector trailer into access conditions for
    /// data blocks 0,1,2 and the trailer itself. On a malformed trailer
    /// (inverted nibbles don't match), default to "readable with Key A only"
    /// per the invariant in §3.
    pub fn decode_trailer(trailer: &[u8]) -> [AccessConditions; 4] {
        if trailer.len() < 10 {
            return [AccessConditions { bits: MALFORMED }; 4];
        }
        let b6 = trailer[6];
        let b7 = trailer[7];
        let b8 = trailer[8];

        let inv_ok = (b6 & 0x0F) == (!b7 >> 4) & 0x0F && (b7 & 0x0F) == (!b8 >> 4) & 0x0F;
        if !inv_ok {
            return [AccessConditions { bits: MALFORMED }; 4];
        }

        let c1 = (b7 >> 4) & 0x0F;
        let c2 = b8 & 0x0F;
        let c3 = (b8 >> 4) & 0x0F;

        let mut out = [AccessConditions::from_bits(0, 0, 0); 4];
        for i in 0..4 {
            out[i] = AccessConditions::from_bits((c1 >> i) & 1, (c2 >> i) & 1, (c3 >> i) & 1);
        }
        out
    }

    /// Which key, if any, may read a data block with these access conditions.
    pub fn can_read(&self) -> ReadAccess {
        match self.bits {
            MALFORMED => ReadAccess::AOnly,
            0b000 | 0b010 | 0b100 | 0b110 | 0b001 => ReadAccess::AorB,
            0b011 | 0b101 | 0b111 => ReadAccess::BOnly,
            _ => ReadAccess::None,
        }
    }

    /// Whether Key A may read/authenticate the trailer itself (bits 3..4 of
    /// the trailer's own access byte use a different table; here we only
    /// decode the common case that Key A can never read Key A back, used
    /// by the dump routine to decide whether to blank the stored key A).
    pub fn trailer_read_key_a(&self) -> bool {
        matches!(self.bits, MALFORMED | 0b000 | 0b010 | 0b100 | 0b110 | 0b001)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_consistency() {
        for profile in [TagProfile::Mini, TagProfile::S1K, TagProfile::S2K, TagProfile::S4K] {
            for s in 0..profile.sectors() {
                let first = profile.first_block_of(s);
                let count = profile.blocks_of(s);
                assert!(first + count - 1 < profile.blocks());
                assert_eq!(profile.sector_of(first), s);
            }
        }
    }

    #[test]
    fn trailer_recognition() {
        for profile in [TagProfile::Mini, TagProfile::S1K, TagProfile::S2K, TagProfile::S4K] {
            for b in 0..profile.blocks() {
                let s = profile.sector_of(b);
                let expected = b == profile.first_block_of(s) + profile.blocks_of(s) - 1;
                assert_eq!(profile.is_trailer(b), expected, "block {b}");
            }
        }
    }

    #[test]
    fn malformed_trailer_defaults_to_a_readable() {
        let trailer = [0u8; 16];
        let decoded = AccessConditions::decode_trailer(&trailer);
        assert_eq!(decoded[0].can_read(), ReadAccess::AOnly);
        assert!(decoded[3].trailer_read_key_a());
    }

    #[test]
    fn default_transport_key_access_conditions_read_with_either_key() {
        // ff 07 80 for bytes 6..9 is the factory-default access condition
        // (transport configuration), which permits both keys to read.
        let mut trailer = [0u8; 16];
        trailer[6] = 0xFF;
        trailer[7] = 0x07;
        trailer[8] = 0x80;
        let decoded = AccessConditions::decode_trailer(&trailer);
        assert_eq!(decoded[0].can_read(), ReadAccess::AorB);
    }
}
