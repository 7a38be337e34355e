//! The engine's single error currency.
//!
//! Every core component (transport, attacks, autopwn, I/O) returns
//! `Result<T, EngineError>`. The CLI binary wraps this in `anyhow::Result`
//! when it composes engine calls with argument parsing and file handling.

use crate::keytable::KeyTable;
use thiserror::Error;

/// Why a nested/hardnested/static-nested attack declined to run or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotVulnerableReason {
    /// Tag does not reply NACK to bad authentications.
    NoNack,
    /// PRNG is hardened; darkside cannot apply.
    PrngUnpredictable,
    /// PRNG looked weak but samples didn't fit the expected pattern.
    PrngAnomalous,
    /// Nested/static-nested exhausted their retry budget without a consistent candidate.
    NoCandidate,
}

impl std::fmt::Display for NotVulnerableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotVulnerableReason::NoNack => "tag does not NACK bad authentications",
            NotVulnerableReason::PrngUnpredictable => "PRNG is hardened",
            NotVulnerableReason::PrngAnomalous => "PRNG looks weak but samples are anomalous",
            NotVulnerableReason::NoCandidate => "no consistent key candidate after retries",
        };
        f.write_str(s)
    }
}

/// Why a file on disk was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileReason {
    NotFound,
    Malformed,
    Size,
}

impl std::fmt::Display for FileReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileReason::NotFound => "not found",
            FileReason::Malformed => "malformed",
            FileReason::Size => "wrong size",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no tag in field")]
    NoTag,
    #[error("anticollision/select failed")]
    SelectError,
    #[error("authentication failed, key was wrong")]
    AuthFail,
    #[error("not vulnerable: {0}")]
    NotVulnerable(NotVulnerableReason),
    #[error("device timed out")]
    Timeout,
    #[error("aborted by user")]
    UserAbort,
    #[error("file error: {0}")]
    FileError(FileReason),
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("finished with keys still missing")]
    Partial(KeyTable),
}

impl EngineError {
    /// Exit code mapping per the error-handling design: `0` only for
    /// success, a distinct non-zero value per error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::NoTag => 1,
            EngineError::SelectError => 2,
            EngineError::AuthFail => 3,
            EngineError::NotVulnerable(_) => 4,
            EngineError::Timeout => 5,
            EngineError::UserAbort => 6,
            EngineError::FileError(_) => 7,
            EngineError::InvalidArg(_) => 8,
            EngineError::OutOfMemory => 9,
            EngineError::Partial(_) => 10,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
