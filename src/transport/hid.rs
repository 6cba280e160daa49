//! USB HID channel backed by `hidapi`.

use hidapi::{HidApi, HidDevice, HidError};
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, info};

use super::{ChannelError, PacketChannel};
use crate::config::DeviceSelector;
use crate::protocol::REPORT_LEN;
use crate::{Result, StationError};

/// The logger uses unnumbered reports; hidapi expects a leading zero report id.
const REPORT_ID: u8 = 0x00;

pub struct HidChannel {
    device: Option<HidDevice>,
}

impl HidChannel {
    /// Open the first logger matching `selector`.
    pub fn open(selector: &DeviceSelector) -> Result<Self> {
        let api = HidApi::new()
            .map_err(|e| StationError::transport_with_source("hid init", e.to_string().into()))?;

        let device = match &selector.serial {
            Some(serial) => api.open_serial(selector.vendor_id, selector.product_id, serial),
            None => api.open(selector.vendor_id, selector.product_id),
        }
        .map_err(|e| {
            StationError::transport_with_source(
                format!("open {:04x}:{:04x}", selector.vendor_id, selector.product_id),
                e.to_string().into(),
            )
        })?;

        info!(
            vendor_id = format_args!("{:04x}", selector.vendor_id),
            product_id = format_args!("{:04x}", selector.product_id),
            "Opened HID logger"
        );
        Ok(Self { device: Some(device) })
    }

    fn classify(error: HidError) -> ChannelError {
        match &error {
            HidError::IoError { error } => match error.kind() {
                ErrorKind::TimedOut => ChannelError::timeout(),
                ErrorKind::WouldBlock => ChannelError::no_data(),
                _ => ChannelError::other(error.to_string()),
            },
            _ => ChannelError::other(error.to_string()),
        }
    }
}

impl PacketChannel for HidChannel {
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ChannelError> {
        let device = self.device.as_ref().ok_or_else(|| ChannelError::other("device closed"))?;
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        match device.read_timeout(buf, millis) {
            // hidapi signals an expired timeout with an empty read.
            Ok(0) => Err(ChannelError::timeout()),
            Ok(n) => Ok(n),
            Err(e) => Err(Self::classify(e)),
        }
    }

    fn write_report(&mut self, report: &[u8]) -> Result<usize, ChannelError> {
        let device = self.device.as_ref().ok_or_else(|| ChannelError::other("device closed"))?;
        let mut out = [0u8; REPORT_LEN + 1];
        out[0] = REPORT_ID;
        let len = report.len().min(REPORT_LEN);
        out[1..=len].copy_from_slice(&report[..len]);
        let written = device.write(&out).map_err(Self::classify)?;
        Ok(written.saturating_sub(1))
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            debug!("Closed HID logger");
        }
    }
}
