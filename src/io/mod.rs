//! Post-recovery I/O (C11): authenticated full dump plus file export/import.

pub mod dump;
pub mod files;
