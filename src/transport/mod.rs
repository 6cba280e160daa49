//! Frame transport over a packet channel.
//!
//! A [`PacketChannel`] moves whole reports and classifies its own failures into
//! [`ChannelErrorKind`]. [`FrameTransport`] sits on top and is the only layer the
//! protocol engine talks to: "nothing within the timeout" comes back as `Ok(None)`,
//! and only real failures surface as [`StationError::Transport`].

#[cfg(feature = "hid")]
mod hid;
#[cfg(feature = "hid")]
pub use hid::HidChannel;

use std::fmt;
use std::time::Duration;
use tracing::trace;

use crate::protocol::REPORT_LEN;
use crate::{Result, StationError};

/// Classification of a failed channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelErrorKind {
    /// Nothing arrived within the read timeout.
    Timeout,
    /// The device reported that no data is pending.
    NoData,
    /// Anything else. Fatal to the session.
    Other,
}

/// Error produced by the lowest I/O layer.
#[derive(Debug)]
pub struct ChannelError {
    pub kind: ChannelErrorKind,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ChannelError {
    pub fn timeout() -> Self {
        Self { kind: ChannelErrorKind::Timeout, source: None }
    }

    pub fn no_data() -> Self {
        Self { kind: ChannelErrorKind::NoData, source: None }
    }

    pub fn other(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self { kind: ChannelErrorKind::Other, source: Some(source.into()) }
    }

    /// Whether this is the idle-link signal rather than a failure.
    pub fn is_idle(&self) -> bool {
        matches!(self.kind, ChannelErrorKind::Timeout | ChannelErrorKind::NoData)
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.source) {
            (ChannelErrorKind::Timeout, _) => f.write_str("read timed out"),
            (ChannelErrorKind::NoData, _) => f.write_str("no data pending"),
            (ChannelErrorKind::Other, Some(source)) => write!(f, "channel failure: {source}"),
            (ChannelErrorKind::Other, None) => f.write_str("channel failure"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Report-oriented device channel.
pub trait PacketChannel: Send {
    /// Read one report into `buf`, waiting at most `timeout`.
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ChannelError>;

    /// Write one full report.
    fn write_report(&mut self, report: &[u8]) -> Result<usize, ChannelError>;

    /// Release the device.
    fn close(&mut self) {}
}

impl<C: PacketChannel + ?Sized> PacketChannel for Box<C> {
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ChannelError> {
        (**self).read_report(buf, timeout)
    }

    fn write_report(&mut self, report: &[u8]) -> Result<usize, ChannelError> {
        (**self).write_report(report)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Blocking, timeout-bounded reads and padded writes of fixed-size reports.
pub struct FrameTransport<C: PacketChannel> {
    channel: C,
    closed: bool,
    log_frames: bool,
}

impl<C: PacketChannel> FrameTransport<C> {
    pub fn new(channel: C) -> Self {
        Self { channel, closed: false, log_frames: false }
    }

    /// Trace every report in both directions.
    pub fn with_frame_logging(mut self, enabled: bool) -> Self {
        self.log_frames = enabled;
        self
    }

    /// Read one report. `Ok(None)` means nothing arrived within `timeout`.
    pub fn read(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(StationError::transport("read on closed transport"));
        }
        let mut buf = [0u8; REPORT_LEN];
        match self.channel.read_report(&mut buf, timeout) {
            Ok(0) => Ok(None),
            Ok(n) => {
                let report = buf[..n.min(REPORT_LEN)].to_vec();
                if self.log_frames {
                    trace!(len = report.len(), bytes = ?report, "report in");
                }
                Ok(Some(report))
            }
            Err(e) if e.is_idle() => Ok(None),
            Err(e) => Err(StationError::transport_with_source("read", Box::new(e))),
        }
    }

    /// Write a command, zero-padded to a full report. Returns the logical length.
    pub fn write(&mut self, command: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(StationError::transport("write on closed transport"));
        }
        if command.len() > REPORT_LEN {
            return Err(StationError::transport(format!(
                "command of {} bytes exceeds report size",
                command.len()
            )));
        }
        let mut report = [0u8; REPORT_LEN];
        report[..command.len()].copy_from_slice(command);
        if self.log_frames {
            trace!(bytes = ?command, "report out");
        }
        self.channel
            .write_report(&report)
            .map_err(|e| StationError::transport_with_source("write", Box::new(e)))?;
        Ok(command.len())
    }

    /// Release the channel. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.closed {
            self.channel.close();
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<C: PacketChannel> Drop for FrameTransport<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ManualClock, MockChannel};

    #[test]
    fn idle_reads_are_not_errors() {
        let clock = ManualClock::new();
        let mut transport = FrameTransport::new(MockChannel::new(clock.clone()));

        assert!(transport.read(Duration::from_millis(100)).unwrap().is_none());
        assert_eq!(clock.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn no_data_is_idle_too() {
        let channel = MockChannel::new(ManualClock::new());
        channel.push_error(ChannelErrorKind::NoData);
        let mut transport = FrameTransport::new(channel);
        assert!(transport.read(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn real_failures_surface_as_transport_errors() {
        let channel = MockChannel::new(ManualClock::new());
        channel.push_error(ChannelErrorKind::Other);
        let mut transport = FrameTransport::new(channel);

        let err = transport.read(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, StationError::Transport { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn writes_are_padded_to_a_report() {
        let channel = MockChannel::new(ManualClock::new());
        let mut transport = FrameTransport::new(channel.clone());

        assert_eq!(transport.write(&[0xA2, 0x91, 0xCA, 0x45, 0x52]).unwrap(), 5);
        let raw = channel.raw_writes();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].len(), REPORT_LEN);
        assert_eq!(raw[0][..5], [0xA2, 0x91, 0xCA, 0x45, 0x52]);
        assert!(raw[0][5..].iter().all(|&b| b == 0));

        assert!(transport.write(&[0u8; REPORT_LEN + 1]).is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let channel = MockChannel::new(ManualClock::new());
        let mut transport = FrameTransport::new(channel.clone());
        transport.close();
        transport.close();
        drop(transport);

        assert_eq!(channel.close_count(), 1);
    }

    #[test]
    fn closed_transport_refuses_io() {
        let mut transport = FrameTransport::new(MockChannel::new(ManualClock::new()));
        transport.close();
        assert!(transport.read(Duration::from_millis(1)).is_err());
        assert!(transport.write(&[0x00]).is_err());
    }
}
