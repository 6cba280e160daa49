//! Frame codec: tag dispatch, fixed-length enforcement and checksum verification.
//!
//! [`classify`] turns a raw USB report into a [`Packet`], stripping report padding
//! beyond the tag's fixed length. [`decode`] accepts exactly one frame's bytes and
//! rejects anything whose length differs from the tag's fixed length.
//!
//! ```rust
//! use wxlink::codec::{decode, Frame, Ack};
//!
//! let bytes = Frame::Ack(Ack { command: 0x73 }).encode();
//! assert_eq!(decode(&bytes), Ok(Frame::Ack(Ack { command: 0x73 })));
//! ```

mod frame;

pub use frame::{
    Ack, ClimateFrame, Frame, HistoryRecord, PressureFrame, RainFrame, StationInfo, WindFrame,
    Word,
};

use crate::error::DecodeError;
use crate::protocol::{
    ChecksumOrder, HISTORY_CONT_HEADER, HISTORY_FRAGMENT_LEN, HISTORY_RECORD_LEN, SPEC_ACK,
    SPEC_CLIMATE, SPEC_HISTORY, SPEC_PRESSURE, SPEC_RAIN, SPEC_STATION_INFO, SPEC_WIND,
    TAG_HISTORY, TAG_HISTORY_CONT, TagSpec, tag_spec,
};

/// A report classified by its leading tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    /// A complete single-report frame, trimmed to its fixed length.
    Frame(&'a [u8]),
    /// First half of a history record.
    HistoryHead(&'a [u8]),
    /// Second half of a history record.
    HistoryTail(&'a [u8]),
}

/// Wrapping 16-bit sum of the given bytes.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

fn stored_checksum(order: ChecksumOrder, pair: [u8; 2]) -> u16 {
    match order {
        ChecksumOrder::HighFirst => u16::from_be_bytes(pair),
        ChecksumOrder::LowFirst => u16::from_le_bytes(pair),
    }
}

fn checksum_bytes(order: ChecksumOrder, sum: u16) -> [u8; 2] {
    match order {
        ChecksumOrder::HighFirst => sum.to_be_bytes(),
        ChecksumOrder::LowFirst => sum.to_le_bytes(),
    }
}

/// Classify one report read from the transport.
pub fn classify(report: &[u8]) -> Result<Packet<'_>, DecodeError> {
    let Some(&tag) = report.first() else {
        return Err(DecodeError::WrongLength { tag: 0, expected: 1, actual: 0 });
    };

    let fragment = |report: &[u8]| -> Result<(), DecodeError> {
        if report.len() < HISTORY_FRAGMENT_LEN {
            return Err(DecodeError::WrongLength {
                tag,
                expected: HISTORY_FRAGMENT_LEN,
                actual: report.len(),
            });
        }
        Ok(())
    };

    match tag {
        TAG_HISTORY => {
            fragment(report)?;
            Ok(Packet::HistoryHead(&report[..HISTORY_FRAGMENT_LEN]))
        }
        TAG_HISTORY_CONT => {
            fragment(report)?;
            Ok(Packet::HistoryTail(&report[..HISTORY_FRAGMENT_LEN]))
        }
        _ => {
            let spec = tag_spec(tag).ok_or(DecodeError::UnknownTag(tag))?;
            if report.len() < spec.len {
                return Err(DecodeError::WrongLength {
                    tag,
                    expected: spec.len,
                    actual: report.len(),
                });
            }
            Ok(Packet::Frame(&report[..spec.len]))
        }
    }
}

/// Join a head and continuation fragment into one logical history record.
pub fn merge_history(head: &[u8], tail: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(HISTORY_RECORD_LEN);
    record.extend_from_slice(head);
    record.extend_from_slice(tail.get(HISTORY_CONT_HEADER..).unwrap_or_default());
    record
}

/// Split an encoded history record into its two transport reports.
pub fn split_history(record: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let cut = HISTORY_FRAGMENT_LEN.min(record.len());
    let head = record[..cut].to_vec();
    let mut tail = Vec::with_capacity(HISTORY_FRAGMENT_LEN);
    tail.push(TAG_HISTORY_CONT);
    tail.push(HISTORY_FRAGMENT_LEN as u8);
    tail.extend_from_slice(&record[cut..]);
    (head, tail)
}

/// Decode exactly one frame.
pub fn decode(raw: &[u8]) -> Result<Frame, DecodeError> {
    let Some(&tag) = raw.first() else {
        return Err(DecodeError::WrongLength { tag: 0, expected: 1, actual: 0 });
    };
    let spec = tag_spec(tag).ok_or(DecodeError::UnknownTag(tag))?;

    if raw.len() != spec.len {
        return Err(DecodeError::WrongLength { tag, expected: spec.len, actual: raw.len() });
    }
    let declared = usize::from(raw[1]);
    if declared != spec.len {
        return Err(DecodeError::WrongLength { tag, expected: spec.len, actual: declared });
    }

    verify_checksum(spec, raw)?;
    frame::parse_body(tag, raw)
}

fn verify_checksum(spec: &TagSpec, raw: &[u8]) -> Result<(), DecodeError> {
    let body = raw.len() - 2;
    let computed = checksum(&raw[..body]);
    let stored = stored_checksum(spec.checksum_order, [raw[body], raw[body + 1]]);
    if computed != stored {
        return Err(DecodeError::BadChecksum { tag: spec.tag, computed, stored });
    }
    Ok(())
}

impl Frame {
    /// Fixed properties of this frame's tag.
    pub fn spec(&self) -> &'static TagSpec {
        match self {
            Frame::Ack(_) => &SPEC_ACK,
            Frame::StationInfo(_) => &SPEC_STATION_INFO,
            Frame::Climate(_) => &SPEC_CLIMATE,
            Frame::Wind(_) => &SPEC_WIND,
            Frame::Rain(_) => &SPEC_RAIN,
            Frame::Pressure(_) => &SPEC_PRESSURE,
            Frame::History(_) => &SPEC_HISTORY,
        }
    }

    /// Serialize to the tag's fixed length with a valid checksum.
    pub fn encode(&self) -> Vec<u8> {
        let spec = self.spec();
        let mut buf = vec![0u8; spec.len];
        buf[0] = spec.tag;
        buf[1] = spec.len as u8;
        frame::write_body(self, &mut buf);

        let body = spec.len - 2;
        let sum = checksum(&buf[..body]);
        buf[body..].copy_from_slice(&checksum_bytes(spec.checksum_order, sum));
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{SENSOR_CHANNELS, TAG_CLIMATE, TAG_WIND};
    use jiff::civil::DateTime;
    use proptest::prelude::*;

    fn arb_word() -> impl Strategy<Value = Word> {
        any::<[u8; 2]>()
    }

    fn arb_timestamp() -> impl Strategy<Value = Option<DateTime>> {
        prop_oneof![
            Just(None),
            (0i16..100, 1i8..=12, 1i8..=28, 0i8..24, 0i8..60).prop_map(|(y, mo, d, h, mi)| {
                DateTime::new(2000 + y, mo, d, h, mi, 0, 0).ok()
            }),
        ]
    }

    fn arb_frame() -> impl Strategy<Value = Frame> {
        prop_oneof![
            any::<u8>().prop_map(|command| Frame::Ack(Ack { command })),
            (any::<[u8; 8]>(), arb_word(), any::<[u8; 2]>(), any::<u16>()).prop_map(
                |(model, firmware, magic, latest_index)| {
                    Frame::StationInfo(StationInfo { model, firmware, magic, latest_index })
                }
            ),
            (arb_timestamp(), 0u8..9, arb_word(), any::<u8>(), arb_word(), arb_word()).prop_map(
                |(timestamp, channel, temperature, humidity, dewpoint, heat_index)| {
                    Frame::Climate(ClimateFrame {
                        timestamp,
                        channel,
                        temperature,
                        humidity,
                        dewpoint,
                        heat_index,
                    })
                }
            ),
            (arb_timestamp(), arb_word(), arb_word(), arb_word(), arb_word(), arb_word())
                .prop_map(|(timestamp, gust_speed, gust_dir, avg_speed, avg_dir, windchill)| {
                    Frame::Wind(WindFrame {
                        timestamp,
                        gust_speed,
                        gust_dir,
                        avg_speed,
                        avg_dir,
                        windchill,
                    })
                }),
            (arb_timestamp(), arb_word(), arb_word(), arb_word()).prop_map(
                |(timestamp, hour, total, rate)| Frame::Rain(RainFrame {
                    timestamp,
                    hour,
                    total,
                    rate
                })
            ),
            (arb_timestamp(), arb_word(), arb_word(), arb_word()).prop_map(
                |(timestamp, station, sea_level, altitude)| Frame::Pressure(PressureFrame {
                    timestamp,
                    station,
                    sea_level,
                    altitude
                })
            ),
            (
                any::<u16>(),
                arb_timestamp(),
                any::<[[u8; 2]; SENSOR_CHANNELS]>(),
                any::<[u8; SENSOR_CHANNELS]>(),
                any::<[[u8; 2]; 12]>(),
            )
                .prop_map(|(index, timestamp, temperature, humidity, w)| {
                    Frame::History(HistoryRecord {
                        index,
                        timestamp,
                        temperature,
                        humidity,
                        dewpoint: w[0],
                        heat_index: w[1],
                        windchill: w[2],
                        gust_speed: w[3],
                        gust_dir: w[4],
                        avg_speed: w[5],
                        avg_dir: w[6],
                        rain_hour: w[7],
                        rain_total: w[8],
                        rain_rate: w[9],
                        pressure: w[10],
                        sea_level: w[11],
                    })
                }),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(frame in arb_frame()) {
            let bytes = frame.encode();
            prop_assert_eq!(bytes.len(), frame.spec().len);
            prop_assert_eq!(decode(&bytes), Ok(frame));
        }

        #[test]
        fn decode_rejects_any_other_length(frame in arb_frame(), delta in 1usize..8, grow in any::<bool>()) {
            let mut bytes = frame.encode();
            if grow {
                bytes.extend(std::iter::repeat_n(0u8, delta));
            } else {
                bytes.truncate(bytes.len().saturating_sub(delta).max(2));
            }
            let is_wrong_length = matches!(decode(&bytes), Err(DecodeError::WrongLength { .. }));
            prop_assert!(is_wrong_length);
        }

        #[test]
        fn corrupting_a_payload_byte_fails_checksum(
            frame in arb_frame(),
            position in 2usize..200,
            flip in 1u8..=255,
        ) {
            let mut bytes = frame.encode();
            let position = 2 + position % (bytes.len() - 4);
            bytes[position] ^= flip;
            let is_bad_checksum = matches!(decode(&bytes), Err(DecodeError::BadChecksum { .. }));
            prop_assert!(is_bad_checksum);
        }
    }

    #[test]
    fn checksum_byte_order_follows_the_tag() {
        let wind = Frame::Wind(WindFrame {
            timestamp: None,
            gust_speed: [0x00, 0x32],
            gust_dir: [0x00, 0x5A],
            avg_speed: [0x00, 0x14],
            avg_dir: [0x00, 0x5A],
            windchill: [0x00, 0x64],
        })
        .encode();
        let sum = checksum(&wind[..wind.len() - 2]);
        assert_eq!(wind[wind.len() - 2..], sum.to_le_bytes());

        // The same bytes read high-first would not verify.
        let mut swapped = wind.clone();
        let n = swapped.len();
        swapped.swap(n - 2, n - 1);
        if sum.to_le_bytes()[0] != sum.to_le_bytes()[1] {
            assert!(matches!(decode(&swapped), Err(DecodeError::BadChecksum { tag: TAG_WIND, .. })));
        }
    }

    #[test]
    fn declared_length_must_match() {
        let mut bytes = Frame::Ack(Ack { command: 0x65 }).encode();
        bytes[1] = 8;
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::WrongLength { tag: 0x41, expected: 7, actual: 8 })
        );
    }

    #[test]
    fn unknown_and_empty_inputs() {
        assert_eq!(decode(&[0x99, 0x02]), Err(DecodeError::UnknownTag(0x99)));
        assert!(matches!(decode(&[]), Err(DecodeError::WrongLength { actual: 0, .. })));
        assert_eq!(classify(&[0x99; 64]), Err(DecodeError::UnknownTag(0x99)));
    }

    #[test]
    fn partial_timestamp_is_a_decode_error() {
        let mut bytes = Frame::Climate(ClimateFrame {
            timestamp: None,
            channel: 0,
            temperature: [0x00, 0xD9],
            humidity: 45,
            dewpoint: [0x00, 0x50],
            heat_index: [0x00, 0xD9],
        })
        .encode();
        bytes[3] = 6; // month set while year and day stay unset
        let body = bytes.len() - 2;
        let sum = checksum(&bytes[..body]);
        bytes[body..].copy_from_slice(&sum.to_be_bytes());

        assert!(matches!(decode(&bytes), Err(DecodeError::BadTimestamp { tag: TAG_CLIMATE, .. })));
    }

    #[test]
    fn classify_strips_report_padding() {
        let frame = Frame::Ack(Ack { command: 0x73 }).encode();
        let mut report = frame.clone();
        report.resize(64, 0);

        assert_eq!(classify(&report), Ok(Packet::Frame(&frame[..])));
        assert!(matches!(
            classify(&frame[..5]),
            Err(DecodeError::WrongLength { tag: 0x41, expected: 7, actual: 5 })
        ));
    }

    #[test]
    fn history_fragments_reassemble() {
        let record = Frame::History(HistoryRecord {
            index: 0x0042,
            timestamp: DateTime::new(2024, 6, 1, 12, 30, 0, 0).ok(),
            temperature: [[0x00, 0xD9]; SENSOR_CHANNELS],
            humidity: [50; SENSOR_CHANNELS],
            dewpoint: [0x00, 0x64],
            heat_index: [0x00, 0xD9],
            windchill: [0x00, 0xD9],
            gust_speed: [0x00, 0x20],
            gust_dir: [0x00, 0x10],
            avg_speed: [0x00, 0x10],
            avg_dir: [0x00, 0x10],
            rain_hour: [0x00, 0x00],
            rain_total: [0x04, 0xB0],
            rain_rate: [0x00, 0x00],
            pressure: [0x27, 0x9E],
            sea_level: [0x27, 0xC0],
        });
        let bytes = record.encode();
        let (head, tail) = split_history(&bytes);

        assert_eq!(head.len(), HISTORY_FRAGMENT_LEN);
        assert_eq!(tail.len(), HISTORY_FRAGMENT_LEN);
        assert!(matches!(classify(&head), Ok(Packet::HistoryHead(_))));
        assert!(matches!(classify(&tail), Ok(Packet::HistoryTail(_))));

        let merged = merge_history(&head, &tail);
        assert_eq!(merged, bytes);
        assert_eq!(decode(&merged), Ok(record));
    }
}
