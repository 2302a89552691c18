//! Fixed-layout sensor reading frames.
//!
//! A frame is 40 bytes: five big-endian IEEE-754 doubles at offsets 0, 8,
//! 16, 24 and 32, in the order temperature, altitude, latitude, longitude,
//! battery level.

use std::fmt;

use crate::error::{Error, Result};
use crate::READING_LENGTH;

const TEMPERATURE_MIN: f64 = -300.0;
const TEMPERATURE_MAX: f64 = 300.0;
const ALTITUDE_MIN: f64 = -20_000.0;
const ALTITUDE_MAX: f64 = 20_000.0;
const LATITUDE_MIN: f64 = -90.0;
const LATITUDE_MAX: f64 = 90.0;
const LONGITUDE_MIN: f64 = -180.0;
const LONGITUDE_MAX: f64 = 180.0;
const BATTERY_MIN: f64 = 0.0;
const BATTERY_MAX: f64 = 100.0;

/// Names a reading field in validation diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Temperature,
    Altitude,
    Latitude,
    Longitude,
    BatteryLevel,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Temperature => "temperature",
            Field::Altitude => "altitude",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::BatteryLevel => "battery level",
        };
        f.write_str(name)
    }
}

/// One set of device readings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Altitude in meters.
    pub altitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Battery level in percent.
    pub battery_level: f64,
}

impl Reading {
    /// Decodes the 40-byte frame at the start of `b` into `self`.
    ///
    /// Each field is range-checked inclusively; the first failure wins and
    /// leaves `self` untouched. Does not allocate.
    ///
    /// # Panics
    ///
    /// Panics when `b` holds fewer than 40 bytes. A short buffer is a caller
    /// bug, not a wire error.
    pub fn decode(&mut self, b: &[u8]) -> Result<()> {
        assert!(
            b.len() >= READING_LENGTH,
            "reading buffer shorter than 40 bytes"
        );

        let temperature = field_at(b, 0);
        check(Field::Temperature, temperature, TEMPERATURE_MIN, TEMPERATURE_MAX)?;
        let altitude = field_at(b, 1);
        check(Field::Altitude, altitude, ALTITUDE_MIN, ALTITUDE_MAX)?;
        let latitude = field_at(b, 2);
        check(Field::Latitude, latitude, LATITUDE_MIN, LATITUDE_MAX)?;
        let longitude = field_at(b, 3);
        check(Field::Longitude, longitude, LONGITUDE_MIN, LONGITUDE_MAX)?;
        let battery_level = field_at(b, 4);
        check(Field::BatteryLevel, battery_level, BATTERY_MIN, BATTERY_MAX)?;

        self.temperature = temperature;
        self.altitude = altitude;
        self.latitude = latitude;
        self.longitude = longitude;
        self.battery_level = battery_level;
        Ok(())
    }

    /// Encodes `self` into `out`, the inverse of [`Reading::decode`].
    pub fn encode_into(&self, out: &mut [u8; READING_LENGTH]) {
        out[0..8].copy_from_slice(&self.temperature.to_be_bytes());
        out[8..16].copy_from_slice(&self.altitude.to_be_bytes());
        out[16..24].copy_from_slice(&self.latitude.to_be_bytes());
        out[24..32].copy_from_slice(&self.longitude.to_be_bytes());
        out[32..40].copy_from_slice(&self.battery_level.to_be_bytes());
    }
}

/// `T,Alt,Lat,Lon,Bat`, each value in its shortest round-trip decimal form.
/// This is both the reading log format and the HTTP body format.
impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.temperature, self.altitude, self.latitude, self.longitude, self.battery_level
        )
    }
}

fn field_at(b: &[u8], index: usize) -> f64 {
    let start = index * 8;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&b[start..start + 8]);
    f64::from_be_bytes(raw)
}

fn check(field: Field, value: f64, min: f64, max: f64) -> Result<()> {
    // NaN fails both comparisons' complements, so it is rejected here too.
    if !(min..=max).contains(&value) {
        return Err(Error::ReadingInvalidField { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Reading {
        Reading {
            temperature: 67.77,
            altitude: 2.63555,
            latitude: 33.41,
            longitude: 44.4,
            battery_level: 0.25666,
        }
    }

    /// The next representable double past `v`, away from zero.
    fn next_outside(v: f64) -> f64 {
        f64::from_bits(v.to_bits() + 1)
    }

    #[test]
    fn test_round_trip() {
        let mut frame = [0u8; READING_LENGTH];
        sample().encode_into(&mut frame);

        let mut decoded = Reading::default();
        decoded.decode(&frame).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_display_shortest_form() {
        assert_eq!(sample().to_string(), "67.77,2.63555,33.41,44.4,0.25666");
        assert_eq!(Reading::default().to_string(), "0,0,0,0,0");
    }

    #[test]
    fn test_inclusive_endpoints_accepted() {
        let endpoints = Reading {
            temperature: TEMPERATURE_MAX,
            altitude: ALTITUDE_MIN,
            latitude: LATITUDE_MAX,
            longitude: LONGITUDE_MIN,
            battery_level: BATTERY_MAX,
        };
        let mut frame = [0u8; READING_LENGTH];
        endpoints.encode_into(&mut frame);

        let mut decoded = Reading::default();
        decoded.decode(&frame).unwrap();
        assert_eq!(decoded, endpoints);
    }

    #[test]
    fn test_first_value_outside_rejected() {
        let cases = [
            (Field::Temperature, next_outside(TEMPERATURE_MAX)),
            (Field::Altitude, next_outside(ALTITUDE_MIN)),
            (Field::Latitude, next_outside(LATITUDE_MAX)),
            (Field::Longitude, next_outside(LONGITUDE_MIN)),
            (Field::BatteryLevel, next_outside(BATTERY_MAX)),
        ];

        for (bad_field, bad_value) in cases {
            let mut reading = sample();
            match bad_field {
                Field::Temperature => reading.temperature = bad_value,
                Field::Altitude => reading.altitude = bad_value,
                Field::Latitude => reading.latitude = bad_value,
                Field::Longitude => reading.longitude = bad_value,
                Field::BatteryLevel => reading.battery_level = bad_value,
            }
            let mut frame = [0u8; READING_LENGTH];
            reading.encode_into(&mut frame);

            let mut decoded = Reading::default();
            let err = decoded.decode(&frame).unwrap_err();
            match err {
                Error::ReadingInvalidField { field, value } => {
                    assert_eq!(field, bad_field);
                    assert_eq!(value, bad_value);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_first_failing_field_wins() {
        let mut reading = sample();
        reading.altitude = 30_000.0;
        reading.battery_level = 120.0;
        let mut frame = [0u8; READING_LENGTH];
        reading.encode_into(&mut frame);

        let mut decoded = Reading::default();
        let err = decoded.decode(&frame).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadingInvalidField {
                field: Field::Altitude,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_decode_leaves_target_untouched() {
        let mut frame = [0u8; READING_LENGTH];
        sample().encode_into(&mut frame);
        frame[0..8].copy_from_slice(&400.0f64.to_be_bytes());

        let mut decoded = sample();
        assert!(decoded.decode(&frame).is_err());
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_nan_rejected() {
        let mut frame = [0u8; READING_LENGTH];
        sample().encode_into(&mut frame);
        frame[16..24].copy_from_slice(&f64::NAN.to_be_bytes());

        let mut decoded = Reading::default();
        assert!(matches!(
            decoded.decode(&frame),
            Err(Error::ReadingInvalidField {
                field: Field::Latitude,
                ..
            })
        ));
    }

    #[test]
    #[should_panic(expected = "reading buffer shorter than 40 bytes")]
    fn test_short_buffer_panics() {
        let mut decoded = Reading::default();
        let _ = decoded.decode(&[0u8; 39]);
    }
}
