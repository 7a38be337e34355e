//! End-to-end scenarios against a `MockTransport`, exercising multiple
//! components together the way the engine's public API will actually be
//! driven.

use mifare_pwn::autopwn::{self, AutopwnConfig, KnownKey};
use mifare_pwn::crypto1::Crypto1;
use mifare_pwn::keytable::{Key, KeyType, Source};
use mifare_pwn::profile::TagProfile;
use mifare_pwn::transport::mock::{MockCardConfig, MockTransport};
use mifare_pwn::transport::{PrngStatic, PrngWeak};
use std::sync::atomic::AtomicBool;

fn cfg(profile: TagProfile, known: Option<KnownKey>) -> AutopwnConfig {
    AutopwnConfig {
        profile,
        known,
        dictionary_path: None,
        slow: false,
        legacy: false,
        simd_hint: None,
    }
}

/// S1: a 1K card with only default keys is fully recovered by dictionary
/// fast-check alone, every key's provenance `Dictionary`.
#[test]
fn s1_default_key_1k_card() {
    let card = MockCardConfig::default_keys_1k();
    let mut transport = MockTransport::new(card);
    let cancel = AtomicBool::new(false);

    let table = autopwn::run(&mut transport, &cfg(TagProfile::S1K, None), &cancel).expect("fully recovered");
    assert_eq!(table.count_found(), TagProfile::S1K.sectors() * 2);
    for sector in 0..table.len() {
        assert_eq!(table.entry(sector).provenance[0], Source::Dictionary);
        assert_eq!(table.entry(sector).provenance[1], Source::Dictionary);
    }
}

/// S2: starting from one known default key, sectors that still carry the
/// default are recovered by reuse propagation, and a sector with a
/// genuinely distinct key falls through to nested recovery.
#[test]
fn s2_known_key_reuse_propagation() {
    let mut card = MockCardConfig::default_keys_1k();
    card.keys[5] = (0x0003_1337, 0x0004_2222);
    let mut transport = MockTransport::new(card);
    let cancel = AtomicBool::new(false);

    let known = KnownKey { sector: 0, keytype: KeyType::A, key: 0xFFFF_FFFF_FFFF };
    let table = autopwn::run(&mut transport, &cfg(TagProfile::S1K, Some(known)), &cancel).expect("fully recovered");
    assert_eq!(table.count_found(), TagProfile::S1K.sectors() * 2);
    assert_eq!(table.entry(0).provenance[0], Source::User);
    assert_eq!(table.entry(5).provenance[0], Source::Nested);
    assert_eq!(table.entry(5).provenance[1], Source::KeyARead);
    assert_eq!(table.key_if_found(5, KeyType::A), Some(0x0003_1337));
    assert_eq!(table.key_if_found(5, KeyType::B), Some(0x0004_2222));
}

/// S5: once Key A is known for a sector with default (permissive) access
/// conditions, Key B is obtained straight from the trailer, not by
/// cryptanalysis.
#[test]
fn s5_read_b_from_trailer() {
    let mut card = MockCardConfig::default_keys_1k();
    card.keys[2] = (0xFFFF_FFFF_FFFF, 0x0102_0304_0506);
    let mut transport = MockTransport::new(card);
    let cancel = AtomicBool::new(false);

    let mut table = mifare_pwn::keytable::KeyTable::new(TagProfile::S1K);
    table.set(2, KeyType::A, 0xFFFF_FFFF_FFFF, Source::User);
    let _ = mifare_pwn::dictionary::propagate_key(&mut transport, &mut table, 0xFFFF_FFFF_FFFF, &cancel);

    // Direct trailer-read path, exercised the way autopwn's per-sector loop does.
    let dump = mifare_pwn::io::dump::dump_card(&mut transport, &table).unwrap();
    let _ = dump; // presence of a dump at all confirms Key A authenticates

    use mifare_pwn::transport::DeviceTransport;
    let trailer_block = TagProfile::S1K.first_block_of(2) + TagProfile::S1K.blocks_of(2) - 1;
    let trailer = transport.read_block(trailer_block, KeyType::A, 0xFFFF_FFFF_FFFF).unwrap();
    let access = mifare_pwn::profile::AccessConditions::decode_trailer(&trailer);
    assert!(access[3].trailer_read_key_a());
    let mut raw = [0u8; 8];
    raw[2..8].copy_from_slice(&trailer[10..16]);
    assert_eq!(u64::from_be_bytes(raw), 0x0102_0304_0506);
}

/// S6: decrypting a trace from nonce/keystream leakage alone, without ever
/// being handed the key — `nt` is public, and an attacker-chosen `nr = 0`
/// nested authentication leaks enough keystream (`nr_enc`, `ar_enc`) to
/// recover the key and decrypt whatever ciphertext followed it.
#[test]
fn s6_decrypt_trace_round_trips() {
    let key = 0x0004_5678_u64;
    let cuid = 0xDEAD_BEEF_u32;
    let nt = 0xB830_049B_u32;
    let data = 0x41E5_86F9_u32;

    let mut enc = Crypto1::new(key);
    enc.clock_word_plain(cuid ^ nt);
    let nr_enc = enc.encrypt_word(0);
    let ar_enc = enc.encrypt_word(mifare_pwn::crypto1::prng_successor(nt, 64));
    let cipher_data = enc.encrypt_word(data);

    let recovered = mifare_pwn::crypto1::decrypt_trace(cuid, nt, nr_enc, ar_enc, cipher_data);
    assert_eq!(recovered, Some(data));
}

/// S3-shaped: nested declines on a hardened PRNG and hardnested's candidate
/// narrowing recovers a non-default sector key that dictionary/reuse never
/// supplied.
#[test]
fn hardened_prng_routes_to_hardnested() {
    let mut card = MockCardConfig::default_keys_1k();
    card.prng_weak = PrngWeak::Hardened;
    card.keys[5] = (0x0003_1337, 0x0004_2222);
    let mut transport = MockTransport::new(card);
    let cancel = AtomicBool::new(false);

    let known = KnownKey { sector: 0, keytype: KeyType::A, key: 0xFFFF_FFFF_FFFF };
    let table = autopwn::run(&mut transport, &cfg(TagProfile::S1K, Some(known)), &cancel).expect("fully recovered");
    assert_eq!(table.count_found(), TagProfile::S1K.sectors() * 2);
    assert_eq!(table.entry(5).provenance[0], Source::Hardnested);
    assert_eq!(table.key_if_found(5, KeyType::A), Some(0x0003_1337));
}

/// S4-shaped: a static-nonce tag is routed to the static-nested attack,
/// which recovers a non-default sector key from a single sample.
#[test]
fn static_prng_routes_to_static_nested() {
    let mut card = MockCardConfig::default_keys_1k();
    card.prng_static = PrngStatic::Static;
    card.keys[5] = (0x0003_1337, 0x0004_2222);
    let mut transport = MockTransport::new(card);
    let cancel = AtomicBool::new(false);

    let known = KnownKey { sector: 0, keytype: KeyType::A, key: 0xFFFF_FFFF_FFFF };
    let table = autopwn::run(&mut transport, &cfg(TagProfile::S1K, Some(known)), &cancel).expect("fully recovered");
    assert_eq!(table.count_found(), TagProfile::S1K.sectors() * 2);
    assert_eq!(table.entry(5).provenance[0], Source::StaticNested);
    assert_eq!(table.key_if_found(5, KeyType::A), Some(0x0003_1337));
}

/// Autopwn soundness (§8 property 8): every recovered key authenticates
/// independently.
#[test]
fn autopwn_soundness() {
    let card = MockCardConfig::default_keys_1k();
    let mut transport = MockTransport::new(card);
    let cancel = AtomicBool::new(false);

    let table = autopwn::run(&mut transport, &cfg(TagProfile::S1K, None), &cancel).expect("fully recovered");
    use mifare_pwn::transport::DeviceTransport;
    for sector in 0..table.len() {
        let first_block = table.profile().first_block_of(sector);
        for kt in [KeyType::A, KeyType::B] {
            let key: Key = table.key_if_found(sector, kt).unwrap();
            assert!(transport.authenticate(first_block, kt, key).is_ok());
        }
    }
}

/// Dictionary idempotence (§8 property 6): a second fast-check run is a
/// no-op on an already-fully-found table.
#[test]
fn dictionary_idempotence() {
    let card = MockCardConfig::default_keys_1k();
    let mut transport = MockTransport::new(card);
    let cancel = AtomicBool::new(false);

    let mut table = mifare_pwn::keytable::KeyTable::new(TagProfile::S1K);
    let keys = mifare_pwn::dictionary::merged_dictionary(&[]);
    mifare_pwn::dictionary::run_fast_check(&mut transport, &mut table, &keys, &cancel).unwrap();
    let before = table.clone();
    let found_again = mifare_pwn::dictionary::run_fast_check(&mut transport, &mut table, &keys, &cancel).unwrap();
    assert_eq!(found_again, 0);
    assert_eq!(before.count_found(), table.count_found());
}
