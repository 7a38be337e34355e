use clap::Parser;
use mifare_pwn::attacks::hardnested::simd::SimdWidth;
use mifare_pwn::autopwn::{self, AutopwnConfig, KnownKey};
use mifare_pwn::cli::{parse_known_key, Cli, Command};
use mifare_pwn::error::EngineError;
use mifare_pwn::io::{dump, files};
use mifare_pwn::keytable::KeyTable;
use mifare_pwn::transport::DeviceTransport;
use mifare_pwn::ui;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn build_transport() -> anyhow::Result<Box<dyn DeviceTransport>> {
    #[cfg(feature = "hardware")]
    {
        Ok(Box::new(mifare_pwn::hardware::Mfrc522Transport::new()?))
    }
    #[cfg(not(feature = "hardware"))]
    {
        anyhow::bail!("built without hardware support; rebuild with --features hardware")
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = mifare_pwn::init_logging(cli.verbose) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        let _ = ctrlc::set_handler(move || cancel.store(true, std::sync::atomic::Ordering::SeqCst));
    }

    match run(cli, &cancel) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            ui::print_error(&e.to_string());
            let code = e.downcast_ref::<EngineError>().map(|e| e.exit_code()).unwrap_or(1);
            std::process::exit(code);
        }
    }
}

fn run(cli: Cli, cancel: &AtomicBool) -> anyhow::Result<()> {
    match cli.command {
        Command::Recover { size, known_key, dict, slow, legacy, simd } => {
            let mut transport = build_transport()?;
            let known = known_key
                .map(|s| parse_known_key(&s))
                .transpose()?
                .map(|(sector, keytype, key)| KnownKey { sector, keytype, key });
            let simd_hint = simd.and_then(|s| match s.to_ascii_lowercase().as_str() {
                "none" => Some(SimdWidth::None),
                "mmx" => Some(SimdWidth::Mmx),
                "sse2" => Some(SimdWidth::Sse2),
                "avx" => Some(SimdWidth::Avx),
                "avx2" => Some(SimdWidth::Avx2),
                "avx512" => Some(SimdWidth::Avx512),
                _ => None,
            });
            let cfg = AutopwnConfig {
                profile: size.into(),
                known,
                dictionary_path: dict,
                slow,
                legacy,
                simd_hint,
            };
            ui::print_section_header("autopwn");
            match autopwn::run(transport.as_mut(), &cfg, cancel) {
                Ok(table) => {
                    table.print();
                    ui::print_success("all keys recovered");
                    Ok(())
                }
                Err(EngineError::Partial(table)) => {
                    table.print();
                    ui::print_warning("finished with some keys still missing");
                    Err(EngineError::Partial(table).into())
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Check { size, dict, legacy } => {
            let mut transport = build_transport()?;
            let mut table = KeyTable::new(size.into());
            let user_keys = match &dict {
                Some(p) => mifare_pwn::dictionary::load_dictionary_file(p)?,
                None => Vec::new(),
            };
            let keys = mifare_pwn::dictionary::merged_dictionary(&user_keys);
            if legacy {
                mifare_pwn::dictionary::run_legacy_check(transport.as_mut(), &mut table, &keys, cancel)?;
            } else {
                mifare_pwn::dictionary::run_fast_check(transport.as_mut(), &mut table, &keys, cancel)?;
            }
            table.print();
            Ok(())
        }
        Command::ReadBlock { block, keytype, key } => {
            let mut transport = build_transport()?;
            let key = u64::from_str_radix(&key, 16)?;
            let data = transport.read_block(block, keytype.into(), key)?;
            ui::print_hex_dump(&data, 16);
            Ok(())
        }
        Command::ReadSector { sector, keytype, key } => {
            let mut transport = build_transport()?;
            let key = u64::from_str_radix(&key, 16)?;
            let profile = mifare_pwn::profile::TagProfile::S1K;
            let first = profile.first_block_of(sector);
            for b in first..first + profile.blocks_of(sector) {
                let data = transport.read_block(b, keytype.into(), key)?;
                ui::print_hex_dump(&data, 16);
            }
            Ok(())
        }
        Command::WriteBlock { block, keytype, key, data } => {
            let mut transport = build_transport()?;
            let key = u64::from_str_radix(&key, 16)?;
            let bytes = hex::decode(&data)?;
            if bytes.len() != 16 {
                anyhow::bail!("data must be exactly 16 bytes of hex");
            }
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&bytes);
            transport.write_block(block, keytype.into(), key, buf)?;
            ui::print_success("block written");
            Ok(())
        }
        Command::Dump { size, keyfile, out } => {
            let mut transport = build_transport()?;
            let table = files::read_key_file(&keyfile, size.into())?;
            let card_dump = dump::dump_card(transport.as_mut(), &table)?;
            files::write_bin(&out, &card_dump)?;
            ui::print_success(&format!("dump written to {}", out.display()));
            Ok(())
        }
        Command::NoncesCollect { path, limit } => {
            let mut transport = build_transport()?;
            let card = transport.select()?;
            let samples = transport.acquire_nonces(
                0,
                mifare_pwn::keytable::KeyType::A,
                0xFFFF_FFFF_FFFF,
                0,
                mifare_pwn::keytable::KeyType::A,
                limit,
                false,
            )?;
            files::write_nonces_file(&path, card.uid32(), &samples)?;
            ui::print_success(&format!("wrote {} nonce sample(s) to {}", samples.len(), path.display()));
            Ok(())
        }
    }
}
