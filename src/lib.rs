//! MIFARE Classic key-recovery and card-manipulation engine.
//!
//! This crate is the host-side cryptanalytic core: the CRYPTO1 primitive,
//! tag profile, key table, dictionary/fast-check, the darkside / nested /
//! hardnested / static-nested attacks, the autopwn orchestrator, and
//! post-recovery dump/export I/O. Raw ISO14443-A framing lives behind the
//! `DeviceTransport` trait; a real transceiver adapter is available under
//! the `hardware` feature, and a `MockTransport` drives this crate's own
//! tests.

pub mod attacks;
pub mod autopwn;
pub mod crypto1;
pub mod dictionary;
pub mod error;
pub mod io;
pub mod keytable;
pub mod profile;
pub mod transport;
pub mod ui;

#[cfg(feature = "hardware")]
pub mod hardware;

pub mod cli;

use env_logger::Builder;
use log::LevelFilter;

/// Initialize structured logging: `verbose` maps to `Info`, otherwise
/// `Warn` — the same mapping the reference toolkit's `utils::logging`
/// module uses.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let mut builder = Builder::new();
    if verbose {
        builder.filter_level(LevelFilter::Info);
    } else {
        builder.filter_level(LevelFilter::Warn);
    }
    builder.init();
    Ok(())
}

/// Dictionary search path, defaulting to a relative `dictionaries/`
/// directory when `MIFARE_DICT_PATH` is unset (§10.3).
pub fn default_dictionary_path() -> std::path::PathBuf {
    std::env::var("MIFARE_DICT_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("dictionaries/default.dic"))
}
