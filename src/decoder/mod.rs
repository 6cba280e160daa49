//! Byte-to-physical-value conversion.
//!
//! Every multi-byte field is big-endian. A field is "not available" exactly when its
//! high byte equals the sentinel of the frame it came from; the low byte is ignored in
//! that case. Two's-complement recovery only happens for non-sentinel values.
//!
//! ```rust
//! use wxlink::decoder::decode_signed;
//!
//! assert_eq!(decode_signed(0x00, 0xD9, 0.1, 0x7F), Some(21.7));
//! assert_eq!(decode_signed(0xFF, 0xF6, 0.1, 0x7F), Some(-1.0));
//! assert_eq!(decode_signed(0x7F, 0x00, 0.1, 0x7F), None);
//! ```

pub mod readings;
mod sensor_map;

pub use readings::{Reading, reading_from_frame};
pub use sensor_map::SensorMap;

use crate::error::DecodeError;
use crate::protocol::TIMESTAMP_UNSET;
use jiff::civil::DateTime;

/// Apply a decimal scale without accumulating binary rounding error.
///
/// Scales below one are treated as divisors (`0.1` divides by ten) so that
/// `217 * 0.1` comes out as `21.7` rather than `21.700000000000003`.
fn apply_scale(raw: i64, scale: f64) -> f64 {
    if scale > 0.0 && scale < 1.0 {
        raw as f64 / scale.recip().round()
    } else {
        raw as f64 * scale
    }
}

/// Decode a signed 16-bit big-endian field.
pub fn decode_signed(hi: u8, lo: u8, scale: f64, sentinel: u8) -> Option<f64> {
    if hi == sentinel {
        return None;
    }
    let raw = i16::from_be_bytes([hi, lo]);
    Some(apply_scale(i64::from(raw), scale))
}

/// Decode an unsigned big-endian field of one or two bytes.
pub fn decode_unsigned(bytes: &[u8], scale: f64, sentinel: u8) -> Option<f64> {
    let (&hi, rest) = bytes.split_first()?;
    if hi == sentinel {
        return None;
    }
    let raw = rest.iter().fold(u64::from(hi), |acc, &b| (acc << 8) | u64::from(b));
    Some(apply_scale(raw as i64, scale))
}

/// Decode a compass direction in whole degrees, normalised into `[0, 360)`.
pub fn decode_direction(bytes: [u8; 2], sentinel: u8) -> Option<f64> {
    if bytes[0] == sentinel {
        return None;
    }
    Some(f64::from(u16::from_be_bytes(bytes) % 360))
}

/// Decode a `(yy, mm, dd, hh, mi)` calendar timestamp.
///
/// Returns `Ok(None)` only when year, month and day all carry the unset marker.
/// A partial match, or a date that does not exist, is a [`DecodeError::BadTimestamp`].
pub fn decode_timestamp(tag: u8, bytes: [u8; 5]) -> Result<Option<DateTime>, DecodeError> {
    let unset = bytes[..3].iter().filter(|&&b| b == TIMESTAMP_UNSET).count();
    match unset {
        3 => return Ok(None),
        0 => {}
        _ => return Err(DecodeError::BadTimestamp { tag, bytes }),
    }

    let [yy, mm, dd, hh, mi] = bytes;
    let narrow = |b: u8| i8::try_from(b).map_err(|_| DecodeError::BadTimestamp { tag, bytes });

    DateTime::new(2000 + i16::from(yy), narrow(mm)?, narrow(dd)?, narrow(hh)?, narrow(mi)?, 0, 0)
        .map(Some)
        .map_err(|_| DecodeError::BadTimestamp { tag, bytes })
}

/// Encode a timestamp; `None` writes the unset marker into every byte.
pub fn encode_timestamp(timestamp: Option<DateTime>) -> [u8; 5] {
    match timestamp {
        None => [TIMESTAMP_UNSET; 5],
        Some(dt) => [
            (dt.year() - 2000).clamp(0, 254) as u8,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
        ],
    }
}
