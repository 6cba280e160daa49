//! Physical readings extracted from decoded frames.

use jiff::civil::DateTime;
use std::collections::BTreeMap;

use super::{decode_direction, decode_signed, decode_unsigned};
use crate::codec::{ClimateFrame, Frame, HistoryRecord, PressureFrame, RainFrame, WindFrame, Word};
use crate::protocol::SENSOR_CHANNELS;

pub const DEWPOINT: &str = "dewpoint";
pub const HEATINDEX: &str = "heatindex";
pub const WINDCHILL: &str = "windchill";
pub const WIND_GUST: &str = "wind_gust";
pub const WIND_GUST_DIR: &str = "wind_gust_dir";
pub const WIND_SPEED: &str = "wind_speed";
pub const WIND_DIR: &str = "wind_dir";
pub const RAIN_HOUR: &str = "rain_hour";
pub const RAIN_TOTAL: &str = "rain_total";
pub const RAIN_RATE: &str = "rain_rate";
pub const RAIN: &str = "rain";
pub const PRESSURE: &str = "pressure";
pub const BAROMETER: &str = "barometer";
pub const ALTITUDE: &str = "altitude";

pub fn temperature_field(channel: usize) -> String {
    format!("temperature_{channel}")
}

pub fn humidity_field(channel: usize) -> String {
    format!("humidity_{channel}")
}

const TENTHS: f64 = 0.1;

/// Sensor values of one frame, keyed by internal field name.
///
/// `None` values mean the station reported the field as not available.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: Option<DateTime>,
    pub fields: BTreeMap<String, Option<f64>>,
}

impl Reading {
    fn new(timestamp: Option<DateTime>) -> Self {
        Self { timestamp, fields: BTreeMap::new() }
    }

    fn set(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied().flatten()
    }
}

fn signed(word: Word, sentinel: u8) -> Option<f64> {
    decode_signed(word[0], word[1], TENTHS, sentinel)
}

fn unsigned(word: Word, sentinel: u8) -> Option<f64> {
    decode_unsigned(&word, TENTHS, sentinel)
}

/// Convert a sensor-bearing frame into a reading.
///
/// Control frames, and climate frames naming a channel the logger does not have,
/// yield `None`.
pub fn reading_from_frame(frame: &Frame) -> Option<Reading> {
    let sentinel = frame.spec().sentinel;
    let reading = match frame {
        Frame::Climate(c) => climate(c, sentinel)?,
        Frame::Wind(w) => wind(w, sentinel),
        Frame::Rain(r) => rain(r, sentinel),
        Frame::Pressure(p) => pressure(p, sentinel),
        Frame::History(h) => history(h, sentinel),
        Frame::Ack(_) | Frame::StationInfo(_) => return None,
    };
    Some(reading)
}

fn climate(c: &ClimateFrame, sentinel: u8) -> Option<Reading> {
    let channel = usize::from(c.channel);
    if channel >= SENSOR_CHANNELS {
        return None;
    }
    let mut reading = Reading::new(c.timestamp);
    reading.set(temperature_field(channel), signed(c.temperature, sentinel));
    reading.set(humidity_field(channel), decode_unsigned(&[c.humidity], 1.0, sentinel));
    // Derived values only travel with the outdoor channel.
    if channel == 1 {
        reading.set(DEWPOINT, signed(c.dewpoint, sentinel));
        reading.set(HEATINDEX, signed(c.heat_index, sentinel));
    }
    Some(reading)
}

fn wind(w: &WindFrame, sentinel: u8) -> Reading {
    let mut reading = Reading::new(w.timestamp);
    reading.set(WIND_GUST, unsigned(w.gust_speed, sentinel));
    reading.set(WIND_GUST_DIR, decode_direction(w.gust_dir, sentinel));
    reading.set(WIND_SPEED, unsigned(w.avg_speed, sentinel));
    reading.set(WIND_DIR, decode_direction(w.avg_dir, sentinel));
    reading.set(WINDCHILL, signed(w.windchill, sentinel));
    reading
}

fn rain(r: &RainFrame, sentinel: u8) -> Reading {
    let mut reading = Reading::new(r.timestamp);
    reading.set(RAIN_HOUR, unsigned(r.hour, sentinel));
    reading.set(RAIN_TOTAL, unsigned(r.total, sentinel));
    reading.set(RAIN_RATE, unsigned(r.rate, sentinel));
    reading
}

fn pressure(p: &PressureFrame, sentinel: u8) -> Reading {
    let mut reading = Reading::new(p.timestamp);
    reading.set(PRESSURE, unsigned(p.station, sentinel));
    reading.set(BAROMETER, unsigned(p.sea_level, sentinel));
    reading.set(ALTITUDE, decode_signed(p.altitude[0], p.altitude[1], 1.0, sentinel));
    reading
}

fn history(h: &HistoryRecord, sentinel: u8) -> Reading {
    let mut reading = Reading::new(h.timestamp);
    for (channel, word) in h.temperature.iter().enumerate() {
        reading.set(temperature_field(channel), signed(*word, sentinel));
    }
    for (channel, &raw) in h.humidity.iter().enumerate() {
        reading.set(humidity_field(channel), decode_unsigned(&[raw], 1.0, sentinel));
    }
    reading.set(DEWPOINT, signed(h.dewpoint, sentinel));
    reading.set(HEATINDEX, signed(h.heat_index, sentinel));
    reading.set(WINDCHILL, signed(h.windchill, sentinel));
    reading.set(WIND_GUST, unsigned(h.gust_speed, sentinel));
    reading.set(WIND_GUST_DIR, decode_direction(h.gust_dir, sentinel));
    reading.set(WIND_SPEED, unsigned(h.avg_speed, sentinel));
    reading.set(WIND_DIR, decode_direction(h.avg_dir, sentinel));
    reading.set(RAIN_HOUR, unsigned(h.rain_hour, sentinel));
    reading.set(RAIN_TOTAL, unsigned(h.rain_total, sentinel));
    reading.set(RAIN_RATE, unsigned(h.rain_rate, sentinel));
    reading.set(PRESSURE, unsigned(h.pressure, sentinel));
    reading.set(BAROMETER, unsigned(h.sea_level, sentinel));
    reading
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Ack;
    use crate::protocol::SENSOR_CHANNELS;

    #[test]
    fn climate_frame_yields_channel_fields() {
        let frame = Frame::Climate(ClimateFrame {
            timestamp: None,
            channel: 1,
            temperature: [0x00, 0xD9],
            humidity: 0x7F,
            dewpoint: [0x00, 0x50],
            heat_index: [0x7F, 0xFF],
        });
        let reading = reading_from_frame(&frame).unwrap();

        assert_eq!(reading.get("temperature_1"), Some(21.7));
        assert_eq!(reading.fields.get("humidity_1"), Some(&None));
        assert_eq!(reading.get(DEWPOINT), Some(8.0));
        assert_eq!(reading.fields.get(HEATINDEX), Some(&None));
    }

    #[test]
    fn indoor_channel_has_no_derived_fields() {
        let frame = Frame::Climate(ClimateFrame {
            timestamp: None,
            channel: 0,
            temperature: [0x00, 0xC8],
            humidity: 40,
            dewpoint: [0x00, 0x50],
            heat_index: [0x00, 0xC8],
        });
        let reading = reading_from_frame(&frame).unwrap();
        assert_eq!(reading.get("temperature_0"), Some(20.0));
        assert_eq!(reading.get("humidity_0"), Some(40.0));
        assert!(!reading.fields.contains_key(DEWPOINT));
    }

    #[test]
    fn climate_channel_outside_the_logger_is_dropped() {
        let base = ClimateFrame {
            timestamp: None,
            channel: SENSOR_CHANNELS as u8,
            temperature: [0x00, 0xC8],
            humidity: 40,
            dewpoint: [0x00, 0x50],
            heat_index: [0x00, 0xC8],
        };
        assert!(reading_from_frame(&Frame::Climate(base)).is_none());
        assert!(reading_from_frame(&Frame::Climate(ClimateFrame { channel: 200, ..base })).is_none());

        let last = ClimateFrame { channel: SENSOR_CHANNELS as u8 - 1, ..base };
        let reading = reading_from_frame(&Frame::Climate(last)).unwrap();
        assert_eq!(reading.get(&temperature_field(SENSOR_CHANNELS - 1)), Some(20.0));
    }

    #[test]
    fn rain_uses_its_own_sentinel() {
        let frame = Frame::Rain(RainFrame {
            timestamp: None,
            hour: [0x7F, 0x00],
            total: [0x04, 0xB0],
            rate: [0xFF, 0xFF],
        });
        let reading = reading_from_frame(&frame).unwrap();
        assert_eq!(reading.get(RAIN_HOUR), Some(3251.2));
        assert_eq!(reading.get(RAIN_TOTAL), Some(120.0));
        assert_eq!(reading.fields.get(RAIN_RATE), Some(&None));
    }

    #[test]
    fn wind_directions_and_speeds() {
        let frame = Frame::Wind(WindFrame {
            timestamp: None,
            gust_speed: [0x00, 0x32],
            gust_dir: [0x01, 0x0E],
            avg_speed: [0x00, 0x14],
            avg_dir: [0x7F, 0x00],
            windchill: [0xFF, 0xF6],
        });
        let reading = reading_from_frame(&frame).unwrap();
        assert_eq!(reading.get(WIND_GUST), Some(5.0));
        assert_eq!(reading.get(WIND_GUST_DIR), Some(270.0));
        assert_eq!(reading.get(WIND_SPEED), Some(2.0));
        assert_eq!(reading.fields.get(WIND_DIR), Some(&None));
        assert_eq!(reading.get(WINDCHILL), Some(-1.0));
    }

    #[test]
    fn history_record_covers_every_channel() {
        let record = HistoryRecord {
            index: 0x20,
            timestamp: None,
            temperature: [[0x00, 0x64]; SENSOR_CHANNELS],
            humidity: [55; SENSOR_CHANNELS],
            dewpoint: [0x00, 0x00],
            heat_index: [0x00, 0x00],
            windchill: [0x00, 0x00],
            gust_speed: [0x00, 0x00],
            gust_dir: [0x00, 0x00],
            avg_speed: [0x00, 0x00],
            avg_dir: [0x00, 0x00],
            rain_hour: [0x00, 0x00],
            rain_total: [0x00, 0x0A],
            rain_rate: [0x00, 0x00],
            pressure: [0x27, 0xAE],
            sea_level: [0x27, 0xC0],
        };
        let reading = reading_from_frame(&Frame::History(record)).unwrap();
        for channel in 0..SENSOR_CHANNELS {
            assert_eq!(reading.get(&temperature_field(channel)), Some(10.0));
            assert_eq!(reading.get(&humidity_field(channel)), Some(55.0));
        }
        assert_eq!(reading.get(PRESSURE), Some(1015.8));
        assert_eq!(reading.get(BAROMETER), Some(1017.6));
    }

    #[test]
    fn control_frames_carry_no_reading() {
        assert!(reading_from_frame(&Frame::Ack(Ack { command: 0x73 })).is_none());
    }
}
