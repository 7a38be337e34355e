//! File export/import (C11 continued): binary/EML/JSON dump formats, the
//! nonces interchange file, and the key dump file.

use crate::error::{EngineError, EngineResult, FileReason};
use crate::io::dump::CardDump;
use crate::keytable::{Key, KeyTable, KeyType, Source};
use crate::profile::TagProfile;
use crate::transport::NonceSample;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

fn open_read(path: &Path) -> EngineResult<std::fs::File> {
    std::fs::File::open(path).map_err(|_| EngineError::FileError(FileReason::NotFound))
}

fn create(path: &Path) -> EngineResult<std::fs::File> {
    std::fs::File::create(path).map_err(|_| EngineError::FileError(FileReason::NotFound))
}

/// Raw binary dump: sector-ordered 16-byte blocks, no header.
pub fn write_bin(path: &Path, dump: &CardDump) -> EngineResult<()> {
    let mut f = create(path)?;
    for block in &dump.blocks {
        f.write_all(block).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
    }
    Ok(())
}

/// Line-delimited hex ("EML") dump: one uppercase hex line per block.
pub fn write_eml(path: &Path, dump: &CardDump) -> EngineResult<()> {
    let mut f = create(path)?;
    for block in &dump.blocks {
        writeln!(f, "{}", hex::encode_upper(block)).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct JsonDump {
    uid: String,
    atqa: String,
    sak: u8,
    blocks: usize,
    data: String,
}

/// JSON envelope: card metadata plus the same payload, hex-encoded.
pub fn write_json(path: &Path, dump: &CardDump) -> EngineResult<()> {
    let flat: Vec<u8> = dump.blocks.iter().flatten().copied().collect();
    let envelope = JsonDump {
        uid: hex::encode_upper(&dump.uid),
        atqa: hex::encode_upper(dump.atqa),
        sak: dump.sak,
        blocks: dump.blocks.len(),
        data: hex::encode_upper(flat),
    };
    let text = serde_json::to_string_pretty(&envelope).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
    std::fs::write(path, text).map_err(|_| EngineError::FileError(FileReason::NotFound))
}

/// Key dump file: `sectors * 6` bytes of Key A, then `sectors * 6` bytes of
/// Key B, in sector order.
pub fn write_key_file(path: &Path, table: &KeyTable) -> EngineResult<()> {
    let mut f = create(path)?;
    for sector in 0..table.len() {
        let key = table.key_if_found(sector, KeyType::A).unwrap_or(crate::keytable::UNKNOWN_KEY);
        f.write_all(&key.to_be_bytes()[2..8]).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
    }
    for sector in 0..table.len() {
        let key = table.key_if_found(sector, KeyType::B).unwrap_or(crate::keytable::UNKNOWN_KEY);
        f.write_all(&key.to_be_bytes()[2..8]).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
    }
    Ok(())
}

/// Read back a key dump file into a fresh `KeyTable`, marking every slot as
/// `Source::User` provenance (loaded key material, not cryptanalysis).
pub fn read_key_file(path: &Path, profile: TagProfile) -> EngineResult<KeyTable> {
    let mut f = open_read(path)?;
    let mut bytes = Vec::new();
    f.read_to_end(&mut bytes).map_err(|_| EngineError::FileError(FileReason::NotFound))?;
    let expected = profile.sectors() * 12;
    if bytes.len() != expected {
        return Err(EngineError::FileError(FileReason::Size));
    }

    let mut table = KeyTable::new(profile);
    for sector in 0..profile.sectors() {
        let a = read_key_at(&bytes, sector * 6);
        table.set(sector, KeyType::A, a, Source::User);
    }
    let b_base = profile.sectors() * 6;
    for sector in 0..profile.sectors() {
        let b = read_key_at(&bytes, b_base + sector * 6);
        table.set(sector, KeyType::B, b, Source::User);
    }
    Ok(table)
}

fn read_key_at(bytes: &[u8], offset: usize) -> Key {
    let mut buf = [0u8; 8];
    buf[2..8].copy_from_slice(&bytes[offset..offset + 6]);
    u64::from_be_bytes(buf)
}

/// Nonces interchange file: `cuid:u32` header, then packed
/// `(nt:u32, nr_enc:u32, ar_enc:u32)` records, terminated by a
/// `0xFFFFFFFF` sentinel.
pub fn write_nonces_file(path: &Path, cuid: u32, samples: &[NonceSample]) -> EngineResult<()> {
    let mut f = create(path)?;
    f.write_all(&cuid.to_le_bytes()).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
    for s in samples {
        f.write_all(&s.nt.to_le_bytes()).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
        f.write_all(&s.nr_enc.to_le_bytes()).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
        f.write_all(&s.ar_enc.to_le_bytes()).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
    }
    f.write_all(&0xFFFF_FFFFu32.to_le_bytes()).map_err(|_| EngineError::FileError(FileReason::Malformed))?;
    Ok(())
}

pub struct LoadedNonces {
    pub cuid: u32,
    pub records: Vec<(u32, u32, u32)>,
}

pub fn read_nonces_file(path: &Path) -> EngineResult<LoadedNonces> {
    let mut f = open_read(path)?;
    let mut bytes = Vec::new();
    f.read_to_end(&mut bytes).map_err(|_| EngineError::FileError(FileReason::NotFound))?;
    if bytes.len() < 4 {
        return Err(EngineError::FileError(FileReason::Size));
    }
    let cuid = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let mut records = Vec::new();
    let mut offset = 4;
    loop {
        if offset + 4 > bytes.len() {
            return Err(EngineError::FileError(FileReason::Malformed));
        }
        let nt = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        if nt == 0xFFFF_FFFF {
            break;
        }
        if offset + 12 > bytes.len() {
            return Err(EngineError::FileError(FileReason::Malformed));
        }
        let nr_enc = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
        let ar_enc = u32::from_le_bytes(bytes[offset + 8..offset + 12].try_into().unwrap());
        records.push((nt, nr_enc, ar_enc));
        offset += 12;
    }
    Ok(LoadedNonces { cuid, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keytable::KeyType as KT;

    #[test]
    fn key_file_round_trips() {
        let dir = std::env::temp_dir().join(format!("mifare-pwn-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("keys.bin");

        let mut table = KeyTable::new(TagProfile::Mini);
        for s in 0..TagProfile::Mini.sectors() {
            table.set(s, KT::A, 0x1122_3344_5566, Source::Dictionary);
            table.set(s, KT::B, 0xAABB_CCDD_EEFF, Source::Dictionary);
        }
        write_key_file(&path, &table).unwrap();
        let loaded = read_key_file(&path, TagProfile::Mini).unwrap();
        for s in 0..TagProfile::Mini.sectors() {
            assert_eq!(loaded.key_if_found(s, KT::A), Some(0x1122_3344_5566));
            assert_eq!(loaded.key_if_found(s, KT::B), Some(0xAABB_CCDD_EEFF));
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn nonces_file_round_trips() {
        let dir = std::env::temp_dir().join(format!("mifare-pwn-test-nonces-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("nonces.bin");

        let samples = vec![
            NonceSample { cuid: 0xAABBCCDD, nt: 0x1111_1111, nr_enc: 0x2222_2222, ar_enc: 0x3333_3333, target_sector: 0, target_keytype: KT::A },
            NonceSample { cuid: 0xAABBCCDD, nt: 0x4444_4444, nr_enc: 0x5555_5555, ar_enc: 0x6666_6666, target_sector: 0, target_keytype: KT::A },
        ];
        write_nonces_file(&path, 0xAABBCCDD, &samples).unwrap();
        let loaded = read_nonces_file(&path).unwrap();
        assert_eq!(loaded.cuid, 0xAABBCCDD);
        assert_eq!(
            loaded.records,
            vec![(0x1111_1111, 0x2222_2222, 0x3333_3333), (0x4444_4444, 0x5555_5555, 0x6666_6666)]
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
