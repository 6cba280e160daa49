//! Typed frame records and their per-tag layouts.
//!
//! Sensor fields are kept as raw big-endian words so that a decoded frame re-encodes
//! to the same bytes; physical conversion happens in [`crate::decoder`].

use jiff::civil::DateTime;

use crate::decoder::{decode_timestamp, encode_timestamp};
use crate::error::DecodeError;
use crate::protocol::{
    SENSOR_CHANNELS, TAG_ACK, TAG_CLIMATE, TAG_HISTORY, TAG_PRESSURE, TAG_RAIN, TAG_STATION_INFO,
    TAG_WIND,
};

/// Raw big-endian 16-bit field.
pub type Word = [u8; 2];

/// Acknowledgment of a host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// First byte of the command being acknowledged.
    pub command: u8,
}

/// Station identity, sent in reply to identify and heartbeat commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationInfo {
    pub model: [u8; 8],
    pub firmware: Word,
    pub magic: [u8; 2],
    /// Index the next history record will be written to.
    pub latest_index: u16,
}

impl StationInfo {
    /// Model string with trailing NULs and padding stripped.
    pub fn model_name(&self) -> String {
        String::from_utf8_lossy(&self.model).trim_end_matches(['\0', ' ']).to_string()
    }
}

/// Temperature/humidity for one sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClimateFrame {
    pub timestamp: Option<DateTime>,
    pub channel: u8,
    pub temperature: Word,
    pub humidity: u8,
    pub dewpoint: Word,
    pub heat_index: Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindFrame {
    pub timestamp: Option<DateTime>,
    pub gust_speed: Word,
    pub gust_dir: Word,
    pub avg_speed: Word,
    pub avg_dir: Word,
    pub windchill: Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RainFrame {
    pub timestamp: Option<DateTime>,
    pub hour: Word,
    /// Cumulative counter since the console was last cleared.
    pub total: Word,
    pub rate: Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureFrame {
    pub timestamp: Option<DateTime>,
    pub station: Word,
    pub sea_level: Word,
    pub altitude: Word,
}

/// One merged history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRecord {
    pub index: u16,
    pub timestamp: Option<DateTime>,
    pub temperature: [Word; SENSOR_CHANNELS],
    pub humidity: [u8; SENSOR_CHANNELS],
    pub dewpoint: Word,
    pub heat_index: Word,
    pub windchill: Word,
    pub gust_speed: Word,
    pub gust_dir: Word,
    pub avg_speed: Word,
    pub avg_dir: Word,
    pub rain_hour: Word,
    pub rain_total: Word,
    pub rain_rate: Word,
    pub pressure: Word,
    pub sea_level: Word,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Ack(Ack),
    StationInfo(StationInfo),
    Climate(ClimateFrame),
    Wind(WindFrame),
    Rain(RainFrame),
    Pressure(PressureFrame),
    History(HistoryRecord),
}

impl Frame {
    pub fn tag(&self) -> u8 {
        match self {
            Frame::Ack(_) => TAG_ACK,
            Frame::StationInfo(_) => TAG_STATION_INFO,
            Frame::Climate(_) => TAG_CLIMATE,
            Frame::Wind(_) => TAG_WIND,
            Frame::Rain(_) => TAG_RAIN,
            Frame::Pressure(_) => TAG_PRESSURE,
            Frame::History(_) => TAG_HISTORY,
        }
    }

    /// Whether this frame carries live sensor data.
    pub fn is_sensor_data(&self) -> bool {
        matches!(self, Frame::Climate(_) | Frame::Wind(_) | Frame::Rain(_) | Frame::Pressure(_))
    }
}

// Offsets shared by all timestamped live frames.
const TS: usize = 2;

fn word(raw: &[u8], offset: usize) -> Word {
    [raw[offset], raw[offset + 1]]
}

fn timestamp_at(tag: u8, raw: &[u8], offset: usize) -> Result<Option<DateTime>, DecodeError> {
    let mut bytes = [0u8; 5];
    bytes.copy_from_slice(&raw[offset..offset + 5]);
    decode_timestamp(tag, bytes)
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// Parse the body of a frame whose length and checksum were already verified.
pub(super) fn parse_body(tag: u8, raw: &[u8]) -> Result<Frame, DecodeError> {
    let frame = match tag {
        TAG_ACK => Frame::Ack(Ack { command: raw[4] }),
        TAG_STATION_INFO => {
            let mut model = [0u8; 8];
            model.copy_from_slice(&raw[2..10]);
            Frame::StationInfo(StationInfo {
                model,
                firmware: word(raw, 10),
                magic: word(raw, 14),
                latest_index: u16::from_be_bytes(word(raw, 16)),
            })
        }
        TAG_CLIMATE => Frame::Climate(ClimateFrame {
            timestamp: timestamp_at(tag, raw, TS)?,
            channel: raw[7],
            temperature: word(raw, 8),
            humidity: raw[10],
            dewpoint: word(raw, 11),
            heat_index: word(raw, 13),
        }),
        TAG_WIND => Frame::Wind(WindFrame {
            timestamp: timestamp_at(tag, raw, TS)?,
            gust_speed: word(raw, 7),
            gust_dir: word(raw, 9),
            avg_speed: word(raw, 11),
            avg_dir: word(raw, 13),
            windchill: word(raw, 15),
        }),
        TAG_RAIN => Frame::Rain(RainFrame {
            timestamp: timestamp_at(tag, raw, TS)?,
            hour: word(raw, 7),
            total: word(raw, 9),
            rate: word(raw, 11),
        }),
        TAG_PRESSURE => Frame::Pressure(PressureFrame {
            timestamp: timestamp_at(tag, raw, TS)?,
            station: word(raw, 7),
            sea_level: word(raw, 9),
            altitude: word(raw, 11),
        }),
        TAG_HISTORY => {
            let mut temperature = [[0u8; 2]; SENSOR_CHANNELS];
            for (ch, slot) in temperature.iter_mut().enumerate() {
                *slot = word(raw, 9 + ch * 2);
            }
            let mut humidity = [0u8; SENSOR_CHANNELS];
            humidity.copy_from_slice(&raw[27..27 + SENSOR_CHANNELS]);

            Frame::History(HistoryRecord {
                index: u16::from_be_bytes(word(raw, 2)),
                timestamp: timestamp_at(tag, raw, 4)?,
                temperature,
                humidity,
                dewpoint: word(raw, 36),
                heat_index: word(raw, 38),
                windchill: word(raw, 40),
                gust_speed: word(raw, 42),
                gust_dir: word(raw, 44),
                avg_speed: word(raw, 46),
                avg_dir: word(raw, 48),
                rain_hour: word(raw, 50),
                rain_total: word(raw, 52),
                rain_rate: word(raw, 54),
                pressure: word(raw, 56),
                sea_level: word(raw, 58),
            })
        }
        other => return Err(DecodeError::UnknownTag(other)),
    };
    Ok(frame)
}

/// Write the body of a frame into a zeroed buffer of the tag's length.
pub(super) fn write_body(frame: &Frame, buf: &mut [u8]) {
    match frame {
        Frame::Ack(ack) => {
            put(buf, 2, b"CK");
            buf[4] = ack.command;
        }
        Frame::StationInfo(info) => {
            put(buf, 2, &info.model);
            put(buf, 10, &info.firmware);
            put(buf, 14, &info.magic);
            put(buf, 16, &info.latest_index.to_be_bytes());
        }
        Frame::Climate(c) => {
            put(buf, TS, &encode_timestamp(c.timestamp));
            buf[7] = c.channel;
            put(buf, 8, &c.temperature);
            buf[10] = c.humidity;
            put(buf, 11, &c.dewpoint);
            put(buf, 13, &c.heat_index);
        }
        Frame::Wind(w) => {
            put(buf, TS, &encode_timestamp(w.timestamp));
            put(buf, 7, &w.gust_speed);
            put(buf, 9, &w.gust_dir);
            put(buf, 11, &w.avg_speed);
            put(buf, 13, &w.avg_dir);
            put(buf, 15, &w.windchill);
        }
        Frame::Rain(r) => {
            put(buf, TS, &encode_timestamp(r.timestamp));
            put(buf, 7, &r.hour);
            put(buf, 9, &r.total);
            put(buf, 11, &r.rate);
        }
        Frame::Pressure(p) => {
            put(buf, TS, &encode_timestamp(p.timestamp));
            put(buf, 7, &p.station);
            put(buf, 9, &p.sea_level);
            put(buf, 11, &p.altitude);
        }
        Frame::History(h) => {
            put(buf, 2, &h.index.to_be_bytes());
            put(buf, 4, &encode_timestamp(h.timestamp));
            for (ch, value) in h.temperature.iter().enumerate() {
                put(buf, 9 + ch * 2, value);
            }
            put(buf, 27, &h.humidity);
            put(buf, 36, &h.dewpoint);
            put(buf, 38, &h.heat_index);
            put(buf, 40, &h.windchill);
            put(buf, 42, &h.gust_speed);
            put(buf, 44, &h.gust_dir);
            put(buf, 46, &h.avg_speed);
            put(buf, 48, &h.avg_dir);
            put(buf, 50, &h.rain_hour);
            put(buf, 52, &h.rain_total);
            put(buf, 54, &h.rain_rate);
            put(buf, 56, &h.pressure);
            put(buf, 58, &h.sea_level);
        }
    }
}
