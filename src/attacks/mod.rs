//! Cryptanalytic attacks: darkside (C6), nested (C7), hardnested (C8),
//! static-nested (C9). Each takes a candidate keyspace and the transport,
//! returning `Found(key)`, a typed `NotVulnerable` reason, or a transport
//! error — the sum-type shape called for in §9's redesign notes, expressed
//! here as `EngineResult<Key>` rather than a sentinel return code.

pub mod darkside;
pub mod hardnested;
pub mod nested;
pub mod static_nested;
