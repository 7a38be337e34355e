//! Command-line front end (§10.4). Thin driver over the core's public API:
//! owns argument parsing, exit-code mapping, and terminal output. Contains
//! no cryptanalytic logic.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SizeArg {
    Mini,
    #[value(name = "1k")]
    S1k,
    #[value(name = "2k")]
    S2k,
    #[value(name = "4k")]
    S4k,
}

impl From<SizeArg> for crate::profile::TagProfile {
    fn from(s: SizeArg) -> Self {
        match s {
            SizeArg::Mini => crate::profile::TagProfile::Mini,
            SizeArg::S1k => crate::profile::TagProfile::S1K,
            SizeArg::S2k => crate::profile::TagProfile::S2K,
            SizeArg::S4k => crate::profile::TagProfile::S4K,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum KeyTypeArg {
    A,
    B,
}

impl From<KeyTypeArg> for crate::keytable::KeyType {
    fn from(k: KeyTypeArg) -> Self {
        match k {
            KeyTypeArg::A => crate::keytable::KeyType::A,
            KeyTypeArg::B => crate::keytable::KeyType::B,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mifare-pwn", about = "MIFARE Classic key-recovery and card-manipulation engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose (Info-level) logging instead of the default Warn level.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recover every sector key on the tag.
    Recover {
        #[arg(long, value_enum)]
        size: SizeArg,
        /// sector,keytype,hexkey
        #[arg(short = 'k', long)]
        known_key: Option<String>,
        #[arg(short = 'f', long)]
        dict: Option<PathBuf>,
        /// Insert a delay between hardnested acquisitions.
        #[arg(short = 's', long)]
        slow: bool,
        /// Use the per-sector authenticate loop instead of device fast-check.
        #[arg(long)]
        legacy: bool,
        #[arg(short = 'i', long)]
        simd: Option<String>,
    },
    /// Bulk-trial a dictionary against every sector.
    Check {
        #[arg(long, value_enum)]
        size: SizeArg,
        #[arg(short = 'f', long)]
        dict: Option<PathBuf>,
        #[arg(long)]
        legacy: bool,
    },
    ReadBlock {
        block: usize,
        #[arg(value_enum)]
        keytype: KeyTypeArg,
        key: String,
    },
    ReadSector {
        sector: usize,
        #[arg(value_enum)]
        keytype: KeyTypeArg,
        key: String,
    },
    WriteBlock {
        block: usize,
        #[arg(value_enum)]
        keytype: KeyTypeArg,
        key: String,
        data: String,
    },
    Dump {
        #[arg(long, value_enum)]
        size: SizeArg,
        #[arg(long)]
        keyfile: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Collect raw nonces to a file for offline hardnested.
    NoncesCollect {
        #[arg(short = 'f', long)]
        path: PathBuf,
        #[arg(long)]
        limit: usize,
    },
}

/// Parse `sector,keytype,hexkey` into its components.
pub fn parse_known_key(s: &str) -> anyhow::Result<(usize, crate::keytable::KeyType, crate::keytable::Key)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        anyhow::bail!("expected sector,keytype,hexkey");
    }
    let sector: usize = parts[0].parse()?;
    let kt = match parts[1].to_ascii_uppercase().as_str() {
        "A" => crate::keytable::KeyType::A,
        "B" => crate::keytable::KeyType::B,
        other => anyhow::bail!("unknown keytype {other}"),
    };
    let key = u64::from_str_radix(parts[2], 16)?;
    Ok((sector, kt, key))
}
