//! Error types for thermomatic-core

use crate::reading::Field;
use thiserror::Error;

/// Everything that can end a device session, plus the locally recovered
/// reading validation failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("imei: not a digit")]
    ImeiInvalid,

    #[error("imei: invalid checksum")]
    ImeiChecksum,

    #[error("reading: {field} out of range: {value}")]
    ReadingInvalidField { field: Field, value: f64 },

    #[error("client unauthorized")]
    LoginUnauthorized,

    #[error("login window expired")]
    LoginExpired,

    #[error("no readings within the idle limit")]
    IdleTimeout,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("device {0} is already connected")]
    DuplicateImei(u64),

    #[error("cancelled")]
    Cancelled,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
