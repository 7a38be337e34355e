//! Human-facing presentation helpers. A thin layer over the structured
//! `log` records the core already emits — see §10.1: these print at most
//! one summary line per attack outcome, they never replace logging.

use crate::error::EngineError;
use crate::keytable::KeyType;

pub fn print_section_header(title: &str) {
    println!("\n=== {title} ===");
}

pub fn print_success(message: &str) {
    println!("[+] {message}");
}

pub fn print_error(message: &str) {
    println!("[!] {message}");
}

pub fn print_warning(message: &str) {
    println!("[*] {message}");
}

/// One summary line for a sector/keytype attack outcome.
pub fn print_attack_outcome(sector: usize, kt: KeyType, result: &Result<u64, EngineError>) {
    match result {
        Ok(key) => print_success(&format!("sector {sector} key {kt:?}: recovered {key:012X}")),
        Err(EngineError::NotVulnerable(reason)) => {
            print_warning(&format!("sector {sector} key {kt:?}: not vulnerable ({reason})"))
        }
        Err(e) => print_error(&format!("sector {sector} key {kt:?}: {e}")),
    }
}

pub fn print_hex_dump(data: &[u8], bytes_per_line: usize) {
    for (i, chunk) in data.chunks(bytes_per_line).enumerate() {
        print!("{:04X}: ", i * bytes_per_line);
        for byte in chunk {
            print!("{byte:02X} ");
        }
        print!(" |");
        for &byte in chunk {
            if (32..=126).contains(&byte) {
                print!("{}", byte as char);
            } else {
                print!(".");
            }
        }
        println!("|");
    }
}
