//! Thermomatic core - shared wire handling for the telemetry server
//!
//! This crate provides:
//! - The IMEI identity decoder (Luhn-checked, allocation-free)
//! - The fixed-layout reading frame decoder and its domain type
//! - Error types

/// Length in bytes of the identity message opening every connection.
pub const IMEI_LENGTH: usize = 15;

/// Length in bytes of one reading frame.
pub const READING_LENGTH: usize = 40;

/// The expected login payload, sent by a device right after its identity.
pub const LOGIN: &[u8; 5] = b"login";

pub mod error;
pub mod imei;
pub mod reading;

// Re-export common types
pub use error::{Error, Result};
pub use reading::{Field, Reading};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_constants() {
        assert_eq!(IMEI_LENGTH, 15);
        assert_eq!(READING_LENGTH, 40);
        assert_eq!(LOGIN, b"login");
    }
}
