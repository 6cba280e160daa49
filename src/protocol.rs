//! Wire constants for the logger protocol.
//!
//! The logger speaks in 64-byte USB interrupt reports. Each inbound frame is led by
//! a one-byte tag and a declared length, and ends with a 16-bit additive checksum.
//!
//! ## Frame Layout
//!
//! ```text
//! [tag][len][payload ...][ck_a][ck_b]
//! ```
//!
//! `len` is the fixed length of the whole frame for that tag. The checksum is the
//! wrapping sum of every byte before `ck_a`; whether `ck_a` is the high or low byte
//! depends on the tag (see [`TagSpec::checksum_order`]).
//!
//! ## History Records
//!
//! A history record is 126 bytes and does not fit one report. It arrives as a head
//! report tagged [`TAG_HISTORY`] carrying bytes `0..64`, followed by a continuation
//! report `[TAG_HISTORY_CONT, 0x40, record[64..126]]`.

/// Size of one USB interrupt report in either direction.
pub const REPORT_LEN: usize = 64;

/// Acknowledgment of a host command: `[0x41, 7, 'C', 'K', cmd, ck, ck]`.
pub const TAG_ACK: u8 = 0x41;
/// Station identity: model, magic bytes and latest history index.
pub const TAG_STATION_INFO: u8 = 0x57;
/// History record head (and tag of the merged logical record).
pub const TAG_HISTORY: u8 = 0xD2;
/// Temperature/humidity reading for one sensor channel.
pub const TAG_CLIMATE: u8 = 0xD3;
/// Wind reading.
pub const TAG_WIND: u8 = 0xD4;
/// Rain reading.
pub const TAG_RAIN: u8 = 0xD5;
/// Pressure reading.
pub const TAG_PRESSURE: u8 = 0xD6;
/// Second half of a history record.
pub const TAG_HISTORY_CONT: u8 = 0xE2;

/// Size of each history fragment report.
pub const HISTORY_FRAGMENT_LEN: usize = REPORT_LEN;
/// Length of a merged history record.
pub const HISTORY_RECORD_LEN: usize = 126;
/// Header bytes (tag + length) on the continuation fragment.
pub const HISTORY_CONT_HEADER: usize = 2;

/// First valid history index in the device ring.
pub const HISTORY_START: u16 = 0x0020;
/// Ring capacity marker. Never assigned to a real record.
pub const HISTORY_MAX: u16 = 0x1000;

/// Year/month/day value marking an unset timestamp.
pub const TIMESTAMP_UNSET: u8 = 0xFF;
/// Number of sensor channels for temperature and humidity.
pub const SENSOR_CHANNELS: usize = 9;

/// Byte order of the stored checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumOrder {
    HighFirst,
    LowFirst,
}

/// Fixed properties of one inbound tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpec {
    pub tag: u8,
    pub len: usize,
    pub checksum_order: ChecksumOrder,
    /// High byte marking a field as "not available".
    pub sentinel: u8,
}

pub const SPEC_ACK: TagSpec =
    TagSpec { tag: TAG_ACK, len: 7, checksum_order: ChecksumOrder::HighFirst, sentinel: 0x7F };
pub const SPEC_STATION_INFO: TagSpec = TagSpec {
    tag: TAG_STATION_INFO,
    len: 32,
    checksum_order: ChecksumOrder::HighFirst,
    sentinel: 0x7F,
};
pub const SPEC_HISTORY: TagSpec = TagSpec {
    tag: TAG_HISTORY,
    len: HISTORY_RECORD_LEN,
    checksum_order: ChecksumOrder::HighFirst,
    sentinel: 0x7F,
};
pub const SPEC_CLIMATE: TagSpec =
    TagSpec { tag: TAG_CLIMATE, len: 34, checksum_order: ChecksumOrder::HighFirst, sentinel: 0x7F };
pub const SPEC_WIND: TagSpec =
    TagSpec { tag: TAG_WIND, len: 36, checksum_order: ChecksumOrder::LowFirst, sentinel: 0x7F };
pub const SPEC_RAIN: TagSpec =
    TagSpec { tag: TAG_RAIN, len: 40, checksum_order: ChecksumOrder::HighFirst, sentinel: 0xFF };
pub const SPEC_PRESSURE: TagSpec = TagSpec {
    tag: TAG_PRESSURE,
    len: 46,
    checksum_order: ChecksumOrder::HighFirst,
    sentinel: 0x7F,
};

const TAG_SPECS: [TagSpec; 7] = [
    SPEC_ACK,
    SPEC_STATION_INFO,
    SPEC_HISTORY,
    SPEC_CLIMATE,
    SPEC_WIND,
    SPEC_RAIN,
    SPEC_PRESSURE,
];

/// Look up the fixed properties of an inbound tag.
pub fn tag_spec(tag: u8) -> Option<&'static TagSpec> {
    TAG_SPECS.iter().find(|spec| spec.tag == tag)
}

// Host commands. Shorter than a report; zero-padded on write.

pub const CMD_IDENTIFY: [u8; 5] = [0xA6, 0x91, 0xCA, 0x45, 0x52];
pub const CMD_HEARTBEAT: [u8; 5] = [0xA2, 0x91, 0xCA, 0x45, 0x52];
pub const CMD_CONFIRM_PREFIX: [u8; 4] = [0x73, 0xE5, 0x0A, 0x26];
pub const CMD_HISTORY_KEEP: [u8; 4] = [0x65, 0x19, 0xE5, 0x04];
pub const CMD_HISTORY_ERASE: [u8; 4] = [0xB3, 0x59, 0x0A, 0x17];
pub const CMD_HISTORY_START_PREFIX: [u8; 4] = [0xCD, 0x18, 0x30, 0x62];
pub const CMD_HISTORY_FINISH: [u8; 4] = [0x61, 0x4E, 0x4F, 0x45];

/// Confirmation command echoing the magic bytes learned during handshake.
pub fn confirm_command(magic: [u8; 2]) -> [u8; 6] {
    let mut cmd = [0u8; 6];
    cmd[..4].copy_from_slice(&CMD_CONFIRM_PREFIX);
    cmd[4..].copy_from_slice(&magic);
    cmd
}

/// "Begin history" command for the requested erase mode.
pub fn history_begin_command(erase: bool) -> [u8; 4] {
    if erase { CMD_HISTORY_ERASE } else { CMD_HISTORY_KEEP }
}

/// "Start streaming history from index N".
pub fn history_start_command(index: u16) -> [u8; 6] {
    let mut cmd = [0u8; 6];
    cmd[..4].copy_from_slice(&CMD_HISTORY_START_PREFIX);
    cmd[4..].copy_from_slice(&index.to_be_bytes());
    cmd
}

/// Clip a history index into `[HISTORY_START, HISTORY_MAX - 1]`.
pub fn clip_index(index: i64) -> u16 {
    index.clamp(i64::from(HISTORY_START), i64::from(HISTORY_MAX) - 1) as u16
}

/// Ring occupancy in percent for a given latest index.
pub fn occupancy_percent(latest_index: u16) -> f64 {
    let used = f64::from(latest_index.saturating_sub(HISTORY_START));
    let capacity = f64::from(HISTORY_MAX - HISTORY_START);
    (used * 100.0 / capacity).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn clip_always_lands_inside_ring(n in any::<i64>()) {
            let clipped = clip_index(n);
            prop_assert!(clipped >= HISTORY_START);
            prop_assert!(clipped <= HISTORY_MAX - 1);
        }

        #[test]
        fn clip_is_identity_inside_ring(n in HISTORY_START..HISTORY_MAX) {
            prop_assert_eq!(clip_index(i64::from(n)), n);
        }
    }

    #[test]
    fn clip_handles_bounds() {
        assert_eq!(clip_index(-5), HISTORY_START);
        assert_eq!(clip_index(0), HISTORY_START);
        assert_eq!(clip_index(i64::from(HISTORY_MAX)), HISTORY_MAX - 1);
        assert_eq!(clip_index(i64::from(HISTORY_MAX) + 1000), HISTORY_MAX - 1);
    }

    #[test]
    fn tag_table_lengths_fit_reports() {
        for spec in TAG_SPECS.iter() {
            assert!(spec.len >= 4, "tag 0x{:02x} too short", spec.tag);
            if spec.tag != TAG_HISTORY {
                assert!(spec.len <= REPORT_LEN, "tag 0x{:02x} exceeds a report", spec.tag);
            }
        }
        assert_eq!(HISTORY_FRAGMENT_LEN + HISTORY_FRAGMENT_LEN - HISTORY_CONT_HEADER, HISTORY_RECORD_LEN);
        assert!(tag_spec(TAG_HISTORY_CONT).is_none());
    }

    #[test]
    fn checksum_order_is_per_tag() {
        assert_eq!(tag_spec(TAG_WIND).map(|s| s.checksum_order), Some(ChecksumOrder::LowFirst));
        assert_eq!(tag_spec(TAG_CLIMATE).map(|s| s.checksum_order), Some(ChecksumOrder::HighFirst));
    }

    #[test]
    fn commands_embed_arguments() {
        assert_eq!(confirm_command([0x0E, 0xC1]), [0x73, 0xE5, 0x0A, 0x26, 0x0E, 0xC1]);
        assert_eq!(history_start_command(0x0123)[4..], [0x01, 0x23]);
        assert_eq!(history_begin_command(true)[0], 0xB3);
        assert_eq!(history_begin_command(false)[0], 0x65);
    }

    #[test]
    fn occupancy_scales_linearly() {
        assert_eq!(occupancy_percent(HISTORY_START), 0.0);
        assert_eq!(occupancy_percent(HISTORY_MAX), 100.0);
        assert_eq!(occupancy_percent(0), 0.0);
        let mid = HISTORY_START + (HISTORY_MAX - HISTORY_START) / 2;
        assert!((occupancy_percent(mid) - 50.0).abs() < 0.1);
    }
}
