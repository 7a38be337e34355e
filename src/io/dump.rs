//! Authenticated full dump (C11): read every block, honoring access
//! conditions to decide which key each data block needs, and always fill
//! both keys back into the trailer copy before persisting.

use crate::error::{EngineError, EngineResult};
use crate::keytable::{KeyTable, KeyType};
use crate::profile::{AccessConditions, ReadAccess, TagProfile};
use crate::transport::DeviceTransport;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDump {
    pub uid: Vec<u8>,
    pub atqa: [u8; 2],
    pub sak: u8,
    pub profile: TagProfile,
    pub blocks: Vec<[u8; 16]>,
    /// True if any block could not be authenticated/read.
    pub partial: bool,
}

/// Read every block of the card, one sector at a time: authenticate the
/// trailer with Key A (or B if A isn't available), decode its access
/// conditions, then read each data block with whichever key they permit.
/// The on-disk trailer always carries both keys, even though the live card
/// never returns Key A on a read.
pub fn dump_card(transport: &mut dyn DeviceTransport, table: &KeyTable) -> EngineResult<CardDump> {
    let card = transport.select()?;
    let profile = table.profile();
    let mut blocks = vec![[0u8; 16]; profile.blocks()];
    let mut partial = false;

    for sector in 0..profile.sectors() {
        let first = profile.first_block_of(sector);
        let count = profile.blocks_of(sector);
        let trailer_block = first + count - 1;

        let (auth_kt, auth_key) = match (table.key_if_found(sector, KeyType::A), table.key_if_found(sector, KeyType::B)) {
            (Some(k), _) => (KeyType::A, k),
            (None, Some(k)) => (KeyType::B, k),
            (None, None) => {
                partial = true;
                continue;
            }
        };

        let trailer = match transport.read_block(trailer_block, auth_kt, auth_key) {
            Ok(data) => data,
            Err(EngineError::AuthFail) | Err(EngineError::Timeout) => {
                partial = true;
                continue;
            }
            Err(e) => return Err(e),
        };
        let access = AccessConditions::decode_trailer(&trailer);

        for b in first..trailer_block {
            let area = b - first;
            let kt = match access[area.min(2)].can_read() {
                ReadAccess::AorB => table.key_if_found(sector, KeyType::A).map(|_| KeyType::A).or(Some(KeyType::B)),
                ReadAccess::AOnly => Some(KeyType::A),
                ReadAccess::BOnly => Some(KeyType::B),
                ReadAccess::None => None,
            };
            let Some(kt) = kt else {
                partial = true;
                continue;
            };
            let Some(key) = table.key_if_found(sector, kt) else {
                partial = true;
                continue;
            };
            match transport.read_block(b, kt, key) {
                Ok(data) => blocks[b] = data,
                Err(EngineError::AuthFail) | Err(EngineError::Timeout) => partial = true,
                Err(e) => return Err(e),
            }
        }

        let mut stored_trailer = trailer;
        if let Some(key_a) = table.key_if_found(sector, KeyType::A) {
            stored_trailer[0..6].copy_from_slice(&key_a.to_be_bytes()[2..8]);
        }
        if let Some(key_b) = table.key_if_found(sector, KeyType::B) {
            stored_trailer[10..16].copy_from_slice(&key_b.to_be_bytes()[2..8]);
        }
        blocks[trailer_block] = stored_trailer;
    }

    Ok(CardDump {
        uid: card.uid,
        atqa: card.atqa,
        sak: card.sak,
        profile,
        blocks,
        partial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keytable::Source;
    use crate::transport::mock::{MockCardConfig, MockTransport};

    #[test]
    fn dump_fills_both_keys_into_trailer() {
        let cfg = MockCardConfig::default_keys_1k();
        let mut transport = MockTransport::new(cfg);
        let mut table = KeyTable::new(TagProfile::S1K);
        for s in 0..TagProfile::S1K.sectors() {
            table.set(s, KeyType::A, 0xFFFF_FFFF_FFFF, Source::Dictionary);
            table.set(s, KeyType::B, 0xFFFF_FFFF_FFFF, Source::Dictionary);
        }
        let dump = dump_card(&mut transport, &table).unwrap();
        assert!(!dump.partial);
        let trailer = dump.blocks[3];
        assert_eq!(&trailer[0..6], &0xFFFF_FFFF_FFFFu64.to_be_bytes()[2..8]);
        assert_eq!(&trailer[10..16], &0xFFFF_FFFF_FFFFu64.to_be_bytes()[2..8]);
    }
}
