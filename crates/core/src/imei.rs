//! IMEI identity decoding.
//!
//! Every device opens its connection with 15 ASCII digits; the 15th is the
//! Luhn check digit over the first 14.

use crate::error::{Error, Result};
use crate::IMEI_LENGTH;

/// Decodes the IMEI contained in the first 15 bytes of `b`.
///
/// Fails with [`Error::ImeiInvalid`] when any of those bytes is not an ASCII
/// digit, and with [`Error::ImeiChecksum`] when the trailing Luhn digit does
/// not match the preceding 14. Does not allocate.
///
/// # Panics
///
/// Panics when `b` holds fewer than 15 bytes. A short buffer is a caller bug,
/// not a wire error.
pub fn decode(b: &[u8]) -> Result<u64> {
    assert!(b.len() >= IMEI_LENGTH, "imei buffer shorter than 15 bytes");

    let mut code: u64 = 0;
    let mut sum: u64 = 0;
    for (i, &byte) in b[..IMEI_LENGTH].iter().enumerate() {
        let digit = u64::from(byte.wrapping_sub(b'0'));
        if digit > 9 {
            return Err(Error::ImeiInvalid);
        }

        code = code * 10 + digit;

        // The check digit is not part of its own sum.
        if i == IMEI_LENGTH - 1 {
            continue;
        }
        if i % 2 == 1 {
            let doubled = digit * 2;
            sum += if doubled > 9 { doubled - 9 } else { doubled };
        } else {
            sum += digit;
        }
    }

    let check = (10 - sum % 10) % 10;
    if check != u64::from(b[IMEI_LENGTH - 1] - b'0') {
        return Err(Error::ImeiChecksum);
    }

    Ok(code)
}
