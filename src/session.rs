//! Link state and the handshake that brings it up.
//!
//! A [`Link`] owns the transport and the clock; a [`Session`] owns everything the
//! protocol learns along the way (magic bytes, latest history index, heartbeat
//! deadline, rain/pressure state). Both are threaded explicitly through the
//! handshake, history sync and live loop, which all run on the same thread.
//!
//! ## Handshake
//!
//! ```text
//! host                          station
//!  |-- flush stale reports ------->|
//!  |-- identify ------------------>|
//!  |<-------------- station info --|  magic bytes, latest index
//!  |-- confirm(magic) ------------>|
//!  |<------------------ ACK 0x73 --|
//! ```

use jiff::civil::DateTime;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::codec::{self, Frame, Packet, StationInfo};
use crate::decoder::{Reading, SensorMap};
use crate::error::DecodeError;
use crate::protocol::{CMD_HEARTBEAT, CMD_IDENTIFY, HISTORY_START, confirm_command, occupancy_percent};
use crate::state::DerivedState;
use crate::transport::{FrameTransport, PacketChannel};
use crate::types::{Provenance, Sample, SessionState, StationStatus, UnitSystem};
use crate::{Result, StationConfig, StationError};

/// Reads allowed while waiting for a specific reply.
pub const REPLY_READ_ATTEMPTS: u32 = 20;
/// Pause between full handshake attempts.
pub const HANDSHAKE_RETRY_PAUSE: Duration = Duration::from_millis(500);

const FLUSH_TIMEOUT: Duration = Duration::from_millis(10);
const FLUSH_MAX_REPORTS: usize = 32;

/// Receives samples as they are produced.
pub trait SampleSink {
    /// Hand a sample over. Returns `false` once the consumer has gone away.
    fn accept(&mut self, sample: Sample) -> bool;
}

impl SampleSink for Vec<Sample> {
    fn accept(&mut self, sample: Sample) -> bool {
        self.push(sample);
        true
    }
}

impl SampleSink for tokio::sync::mpsc::UnboundedSender<Result<Sample>> {
    fn accept(&mut self, sample: Sample) -> bool {
        self.send(Ok(sample)).is_ok()
    }
}

/// Transport plus time source, owned by the engine thread.
pub struct Link<C: PacketChannel, K: Clock> {
    transport: FrameTransport<C>,
    clock: K,
    read_timeout: Duration,
}

impl<C: PacketChannel, K: Clock> Link<C, K> {
    pub fn new(channel: C, clock: K, config: &StationConfig) -> Self {
        Self {
            transport: FrameTransport::new(channel).with_frame_logging(config.debug.log_frames),
            clock,
            read_timeout: config.read_timeout(),
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn pause(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    /// One bounded read. `Ok(None)` when the link is idle.
    pub fn read(&mut self) -> Result<Option<Vec<u8>>> {
        self.transport.read(self.read_timeout)
    }

    pub fn send(&mut self, command: &[u8]) -> Result<()> {
        trace!(command = ?command, "send");
        self.transport.write(command).map(|_| ())
    }

    /// Drain reports left over from before this exchange.
    pub fn flush_stale(&mut self) -> Result<usize> {
        let mut flushed = 0;
        while flushed < FLUSH_MAX_REPORTS {
            match self.transport.read(FLUSH_TIMEOUT)? {
                Some(_) => flushed += 1,
                None => break,
            }
        }
        if flushed > 0 {
            debug!(flushed, "Discarded stale reports");
        }
        Ok(flushed)
    }

    /// Read until `pick` accepts a frame, within `attempts` reads.
    pub fn await_frame<T>(
        &mut self,
        stage: &str,
        attempts: u32,
        mut pick: impl FnMut(&Frame) -> Option<T>,
    ) -> Result<T> {
        for _ in 0..attempts {
            let Some(report) = self.read()? else {
                continue;
            };
            match decode_report(&report) {
                Ok(Some(frame)) => match pick(&frame) {
                    Some(found) => return Ok(found),
                    None => trace!(stage, tag = frame.tag(), "Ignoring frame while waiting"),
                },
                Ok(None) => trace!(stage, "Ignoring history fragment while waiting"),
                Err(e) => debug!(stage, error = %e, "Dropping undecodable frame while waiting"),
            }
        }
        Err(StationError::protocol_exhausted(stage, attempts))
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}

/// Decode a single-report frame. History fragments yield `Ok(None)`.
pub fn decode_report(report: &[u8]) -> Result<Option<Frame>, DecodeError> {
    match codec::classify(report)? {
        Packet::Frame(bytes) => codec::decode(bytes).map(Some),
        Packet::HistoryHead(_) | Packet::HistoryTail(_) => Ok(None),
    }
}

/// Everything learned and tracked over one connection.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    magic: Option<[u8; 2]>,
    model: Option<String>,
    latest_index: u16,
    last_consumed_index: Option<u16>,
    heartbeat_interval: Duration,
    heartbeat_deadline: Option<Instant>,
    last_history_timestamp: Option<DateTime>,
    /// Rain and pressure baselines. Live and replayed samples come from different
    /// points in time, so each provenance keeps its own.
    live_derived: DerivedState,
    history_derived: DerivedState,
    sensor_map: SensorMap,
    heartbeats_sent: u64,
    samples_emitted: u64,
    frames_dropped: u64,
}

impl Session {
    pub fn new(config: &StationConfig) -> Self {
        Self {
            state: SessionState::Disconnected,
            magic: None,
            model: None,
            latest_index: HISTORY_START,
            last_consumed_index: None,
            heartbeat_interval: config.heartbeat_period(),
            heartbeat_deadline: None,
            last_history_timestamp: None,
            live_derived: DerivedState::default(),
            history_derived: DerivedState::default(),
            sensor_map: config.sensor_map.clone(),
            heartbeats_sent: 0,
            samples_emitted: 0,
            frames_dropped: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            trace!(from = %self.state, to = %state, "Session state");
            self.state = state;
        }
    }

    pub fn magic(&self) -> Option<[u8; 2]> {
        self.magic
    }

    pub fn latest_index(&self) -> u16 {
        self.latest_index
    }

    pub fn last_consumed_index(&self) -> Option<u16> {
        self.last_consumed_index
    }

    pub fn last_history_timestamp(&self) -> Option<DateTime> {
        self.last_history_timestamp
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent
    }

    pub fn occupancy(&self) -> f64 {
        occupancy_percent(self.latest_index)
    }

    pub(crate) fn set_last_consumed(&mut self, index: u16) {
        self.last_consumed_index = Some(index);
    }

    pub(crate) fn set_last_history_timestamp(&mut self, timestamp: DateTime) {
        self.last_history_timestamp = Some(timestamp);
    }

    /// Forget the history cursor after the station erased its ring.
    pub(crate) fn reset_cursor(&mut self) {
        self.last_consumed_index = None;
        self.latest_index = HISTORY_START;
    }

    /// Seed the resume point, e.g. from a previous connection.
    pub fn resume_from(&mut self, last_consumed_index: Option<u16>, timestamp: Option<DateTime>) {
        self.last_consumed_index = last_consumed_index;
        self.last_history_timestamp = timestamp;
    }

    pub(crate) fn frame_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    /// Record a station identity frame.
    pub(crate) fn observe_station_info(&mut self, info: &StationInfo) {
        if self.latest_index != info.latest_index {
            debug!(from = self.latest_index, to = info.latest_index, "Latest history index");
        }
        self.latest_index = info.latest_index;
        if self.model.is_none() {
            self.model = Some(info.model_name());
        }
    }

    fn reset_heartbeat(&mut self, now: Instant) {
        self.heartbeat_deadline = Some(now + self.heartbeat_interval);
    }

    /// Send a heartbeat if the deadline has passed.
    pub fn heartbeat_if_due<C: PacketChannel, K: Clock>(&mut self, link: &mut Link<C, K>) -> Result<bool> {
        let now = link.now();
        match self.heartbeat_deadline {
            Some(deadline) if now >= deadline => {
                link.send(&CMD_HEARTBEAT)?;
                self.heartbeats_sent += 1;
                self.reset_heartbeat(now);
                trace!(sent = self.heartbeats_sent, "Heartbeat");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Apply derived state and the sensor map, producing a sample ready to hand off.
    pub(crate) fn make_sample(
        &mut self,
        reading: Reading,
        provenance: Provenance,
        interval: Option<i64>,
    ) -> Sample {
        let Reading { timestamp, mut fields } = reading;
        let derived = match provenance {
            Provenance::Live => &mut self.live_derived,
            Provenance::Historical => &mut self.history_derived,
        };
        derived.apply(&mut fields);
        self.samples_emitted += 1;
        Sample {
            timestamp,
            units: UnitSystem::Metric,
            provenance,
            interval,
            fields: self.sensor_map.apply(fields),
        }
    }

    pub fn status(&self) -> StationStatus {
        StationStatus {
            state: self.state,
            model: self.model.clone(),
            latest_index: self.latest_index,
            last_consumed_index: self.last_consumed_index,
            occupancy: self.occupancy(),
            heartbeats_sent: self.heartbeats_sent,
            samples_emitted: self.samples_emitted,
            frames_dropped: self.frames_dropped,
        }
    }
}

/// Bring the link up, retrying the whole exchange up to `attempts` times.
///
/// Transport failures abort immediately; only exhausted reply waits are retried.
pub fn handshake<C: PacketChannel, K: Clock>(
    link: &mut Link<C, K>,
    session: &mut Session,
    attempts: u32,
) -> Result<()> {
    session.set_state(SessionState::Handshaking);

    for attempt in 1..=attempts {
        match try_handshake(link, session) {
            Ok(()) => {
                session.set_state(SessionState::Ready);
                session.reset_heartbeat(link.now());
                info!(
                    attempt,
                    model = session.model.as_deref().unwrap_or("unknown"),
                    latest_index = session.latest_index,
                    "Handshake complete"
                );
                return Ok(());
            }
            Err(StationError::Protocol { stage, .. }) => {
                warn!(attempt, attempts, stage = %stage, "Handshake attempt failed");
                if attempt < attempts {
                    link.pause(HANDSHAKE_RETRY_PAUSE);
                }
            }
            Err(e) => {
                session.set_state(SessionState::Disconnected);
                return Err(e);
            }
        }
    }

    session.set_state(SessionState::Disconnected);
    Err(StationError::protocol_exhausted("handshake", attempts))
}

fn try_handshake<C: PacketChannel, K: Clock>(link: &mut Link<C, K>, session: &mut Session) -> Result<()> {
    link.flush_stale()?;

    link.send(&CMD_IDENTIFY)?;
    let info = link.await_frame("identify", REPLY_READ_ATTEMPTS, |frame| match frame {
        Frame::StationInfo(info) => Some(*info),
        _ => None,
    })?;
    session.magic = Some(info.magic);
    session.observe_station_info(&info);
    debug!(magic = ?info.magic, latest_index = info.latest_index, "Station identified");

    let confirm = confirm_command(info.magic);
    link.send(&confirm)?;
    link.await_frame("confirm", REPLY_READ_ATTEMPTS, |frame| match frame {
        Frame::Ack(ack) if ack.command == confirm[0] => Some(()),
        _ => None,
    })
}
