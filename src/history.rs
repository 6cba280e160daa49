//! Bulk replay of the station's history ring.
//!
//! A pass asks the station to stream its ring from a start index, reassembles the
//! two-report history records, and emits every record newer than the caller's
//! "resume since" bound. Live frames may arrive interleaved at any point; station
//! identity frames update the end of the ring, everything else is ignored.
//!
//! The heartbeat deadline is checked on every read so a long replay never lets the
//! station drop out of streaming mode.

use jiff::civil::DateTime;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::codec::{self, Frame, HistoryRecord, Packet};
use crate::decoder::reading_from_frame;
use crate::live::Control;
use crate::protocol::{
    CMD_HISTORY_FINISH, HISTORY_MAX, HISTORY_START, clip_index, history_begin_command,
    history_start_command,
};
use crate::session::{Link, REPLY_READ_ATTEMPTS, SampleSink, Session, decode_report};
use crate::transport::PacketChannel;
use crate::types::{Provenance, SessionState};
use crate::{Result, StationError};

/// Consecutive reads without history progress before a pass gives up.
pub const STALL_READS: u32 = 40;

/// Parameters of one history pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Only records stamped strictly after this are emitted.
    pub since: Option<DateTime>,
    /// Ask the station to erase delivered records.
    pub erase: bool,
    /// Log every replayed record.
    pub log_records: bool,
}

/// Outcome of a history pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub start_index: u16,
    pub records: u32,
    pub emitted: u32,
    pub replayed: u32,
    pub gaps: u32,
    pub discarded_fragments: u32,
    /// Records whose index lies outside the ring.
    pub out_of_ring: u32,
    /// The pass ended because the station stopped sending history.
    pub stalled: bool,
}

/// Position within the history ring for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCursor {
    last_consumed: Option<u16>,
    latest: u16,
}

/// How a record index relates to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    InOrder,
    /// Records between the expected index and this one were lost.
    Gap { missing: u16 },
    /// Already consumed in this or a previous pass.
    Replay,
}

impl HistoryCursor {
    pub fn new(last_consumed: Option<u16>, latest: u16) -> Self {
        Self { last_consumed, latest }
    }

    /// Cursor for a pass in the given mode. Erasing restarts from the ring start.
    pub fn for_pass(session: &Session, erase: bool) -> Self {
        let last = if erase { None } else { session.last_consumed_index() };
        Self::new(last, session.latest_index())
    }

    /// Index the station is asked to stream from.
    pub fn start_index(&self) -> u16 {
        clip_index(i64::from(self.last_consumed.unwrap_or(HISTORY_START)))
    }

    pub fn next_expected(&self) -> u16 {
        self.last_consumed.map_or(HISTORY_START, |last| last.saturating_add(1))
    }

    pub fn last_consumed(&self) -> Option<u16> {
        self.last_consumed
    }

    pub fn latest(&self) -> u16 {
        self.latest
    }

    pub fn set_latest(&mut self, latest: u16) {
        self.latest = latest;
    }

    pub fn is_complete(&self) -> bool {
        self.next_expected() >= self.latest
    }

    /// Account for a received record index.
    pub fn advance(&mut self, index: u16) -> Advance {
        if self.last_consumed.is_some_and(|last| index <= last) {
            return Advance::Replay;
        }
        let expected = self.next_expected();
        self.last_consumed = Some(index);
        if index > expected { Advance::Gap { missing: index - expected } } else { Advance::InOrder }
    }
}

/// Pairs history head reports with their continuation.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    head: Option<Vec<u8>>,
}

impl FragmentAssembler {
    /// Buffer a head report. Returns `true` if an unpaired head was replaced.
    pub fn head(&mut self, bytes: &[u8]) -> bool {
        self.head.replace(bytes.to_vec()).is_some()
    }

    /// Complete a record with its continuation, if a head is waiting.
    pub fn tail(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        self.head.take().map(|head| codec::merge_history(&head, bytes))
    }

    /// Another frame arrived. Returns `true` if a buffered head was dropped.
    pub fn interrupt(&mut self) -> bool {
        self.head.take().is_some()
    }
}

/// Run one history pass.
pub fn synchronize<C: PacketChannel, K: Clock, S: SampleSink>(
    link: &mut Link<C, K>,
    session: &mut Session,
    options: SyncOptions,
    control: &mut Control,
    sink: &mut S,
) -> Result<SyncReport> {
    let mut cursor = HistoryCursor::for_pass(session, options.erase);
    let mut report = SyncReport { start_index: cursor.start_index(), ..SyncReport::default() };

    if cursor.is_complete() {
        debug!(latest_index = cursor.latest(), "No history to replay");
        return Ok(report);
    }

    let previous_state = session.state();
    session.set_state(SessionState::Syncing);
    info!(
        start_index = report.start_index,
        latest_index = cursor.latest(),
        erase = options.erase,
        since = ?options.since,
        "History sync started"
    );

    if let Err(e) = run_pass(link, session, &mut cursor, options, control, sink, &mut report) {
        if !matches!(e, StationError::Transport { .. }) {
            if let Err(finish) = link.send(&CMD_HISTORY_FINISH) {
                debug!(error = %finish, "History finish failed after aborted pass");
            }
        }
        return Err(e);
    }

    link.send(&CMD_HISTORY_FINISH)?;
    // Only a pass that reached the end of the ring has had everything erased.
    if options.erase && cursor.is_complete() {
        session.reset_cursor();
    }
    session.set_state(if previous_state == SessionState::Streaming {
        SessionState::Streaming
    } else {
        SessionState::Ready
    });

    info!(
        records = report.records,
        emitted = report.emitted,
        gaps = report.gaps,
        stalled = report.stalled,
        last_consumed_index = ?cursor.last_consumed(),
        "History sync finished"
    );
    Ok(report)
}

fn run_pass<C: PacketChannel, K: Clock, S: SampleSink>(
    link: &mut Link<C, K>,
    session: &mut Session,
    cursor: &mut HistoryCursor,
    options: SyncOptions,
    control: &mut Control,
    sink: &mut S,
    report: &mut SyncReport,
) -> Result<()> {
    let begin = history_begin_command(options.erase);
    link.send(&begin)?;
    let mut acked = false;
    for _ in 0..REPLY_READ_ATTEMPTS {
        control.serve_status(session);
        session.heartbeat_if_due(link)?;
        let Some(raw) = link.read()? else {
            continue;
        };
        match decode_report(&raw) {
            Ok(Some(Frame::Ack(ack))) if ack.command == begin[0] => {
                acked = true;
                break;
            }
            Ok(Some(Frame::StationInfo(info))) => {
                session.observe_station_info(&info);
                cursor.set_latest(info.latest_index);
            }
            Ok(_) => trace!("Flushing frame while waiting for history ACK"),
            Err(e) => debug!(error = %e, "Dropping undecodable frame while waiting for history ACK"),
        }
    }
    if !acked {
        return Err(StationError::protocol_exhausted("history begin", REPLY_READ_ATTEMPTS));
    }

    link.send(&history_start_command(report.start_index))?;

    let mut assembler = FragmentAssembler::default();
    let mut idle_reads = 0u32;

    while !cursor.is_complete() {
        if control.is_cancelled() {
            debug!("History sync interrupted by shutdown");
            return Ok(());
        }
        control.serve_status(session);
        session.heartbeat_if_due(link)?;

        if idle_reads >= STALL_READS {
            warn!(
                next_expected = cursor.next_expected(),
                latest_index = cursor.latest(),
                "History stream stalled, finishing pass early"
            );
            report.stalled = true;
            return Ok(());
        }

        let Some(raw) = link.read()? else {
            idle_reads += 1;
            continue;
        };

        let packet = match codec::classify(&raw) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Dropping malformed report during history sync");
                session.frame_dropped();
                idle_reads += 1;
                if assembler.interrupt() {
                    report.discarded_fragments += 1;
                }
                continue;
            }
        };

        match packet {
            Packet::HistoryHead(bytes) => {
                idle_reads = 0;
                if assembler.head(bytes) {
                    debug!("Discarding history head without continuation");
                    report.discarded_fragments += 1;
                }
            }
            Packet::HistoryTail(bytes) => {
                idle_reads = 0;
                let Some(record) = assembler.tail(bytes) else {
                    debug!("Discarding history continuation without head");
                    report.discarded_fragments += 1;
                    continue;
                };
                match codec::decode(&record) {
                    Ok(Frame::History(record)) => {
                        if !consume(session, cursor, record, options, sink, report) {
                            return Err(StationError::Shutdown);
                        }
                    }
                    Ok(other) => trace!(tag = other.tag(), "Unexpected merged frame"),
                    Err(e) => {
                        warn!(error = %e, "Dropping corrupt history record");
                        session.frame_dropped();
                    }
                }
            }
            Packet::Frame(bytes) => {
                idle_reads += 1;
                if assembler.interrupt() {
                    debug!("Discarding history head interrupted by another frame");
                    report.discarded_fragments += 1;
                }
                match codec::decode(bytes) {
                    Ok(Frame::StationInfo(info)) => {
                        session.observe_station_info(&info);
                        cursor.set_latest(info.latest_index);
                    }
                    Ok(frame) => trace!(tag = frame.tag(), "Ignoring frame during history sync"),
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed frame during history sync");
                        session.frame_dropped();
                    }
                }
            }
        }
    }
    Ok(())
}

/// Apply one decoded record. Returns `false` if the consumer has gone away.
fn consume<S: SampleSink>(
    session: &mut Session,
    cursor: &mut HistoryCursor,
    record: HistoryRecord,
    options: SyncOptions,
    sink: &mut S,
    report: &mut SyncReport,
) -> bool {
    report.records += 1;
    if !(HISTORY_START..HISTORY_MAX).contains(&record.index) {
        warn!(index = record.index, "History record index outside the ring, dropping");
        report.out_of_ring += 1;
        session.frame_dropped();
        return true;
    }
    match cursor.advance(record.index) {
        Advance::Replay => {
            debug!(index = record.index, "Skipping replayed history record");
            report.replayed += 1;
            return true;
        }
        Advance::Gap { missing } => {
            warn!(index = record.index, missing, "History records lost");
            report.gaps += 1;
        }
        Advance::InOrder => {}
    }
    session.set_last_consumed(record.index);

    if options.log_records {
        debug!(index = record.index, timestamp = ?record.timestamp, "History record");
    }

    let newer = match (options.since, record.timestamp) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(since), Some(ts)) => ts > since,
    };
    if !newer {
        trace!(index = record.index, "History record already delivered");
        return true;
    }

    let interval = match (session.last_history_timestamp(), record.timestamp) {
        (Some(previous), Some(ts)) => {
            let minutes = ts.duration_since(previous).as_secs() / 60;
            (minutes > 0).then_some(minutes)
        }
        _ => None,
    };
    if let Some(ts) = record.timestamp {
        session.set_last_history_timestamp(ts);
    }

    let Some(reading) = reading_from_frame(&Frame::History(record)) else {
        return true;
    };
    let sample = session.make_sample(reading, Provenance::Historical, interval);
    report.emitted += 1;
    sink.accept(sample)
}
