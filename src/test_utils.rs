//! Scripted station doubles for tests and benchmarks.
//!
//! [`MockChannel`] plays the logger side of the link: it serves preloaded reports,
//! answers commands with canned replies, and records every read and write in one
//! ordered event log. Reads that find nothing advance a shared [`ManualClock`] by
//! the requested timeout, so heartbeat and retry timing is exact and instant.

#![cfg(any(test, feature = "benchmark"))]

use jiff::civil::DateTime;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::codec::{self, Ack, ClimateFrame, Frame, HistoryRecord, StationInfo};
use crate::protocol::{REPORT_LEN, SENSOR_CHANNELS};
use crate::transport::{ChannelError, ChannelErrorKind, PacketChannel};

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { base: Instant::now(), offset: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    /// Time advanced since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// One entry in the channel's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A read, with the tag of the report it returned.
    Read(Option<u8>),
    /// A write, holding the full padded report.
    Write(Vec<u8>),
}

#[derive(Debug, Clone)]
enum Scripted {
    Report(Vec<u8>),
    Error(ChannelErrorKind),
}

#[derive(Default)]
struct Inner {
    inbox: VecDeque<Scripted>,
    pending: VecDeque<Vec<u8>>,
    once: HashMap<u8, VecDeque<Vec<Vec<u8>>>>,
    standing: HashMap<u8, Vec<Vec<u8>>>,
    events: Vec<ChannelEvent>,
    hangup_after: Option<Duration>,
    idle_sleep: Option<Duration>,
    close_count: usize,
}

/// Scripted logger double implementing [`PacketChannel`]. Clones share state.
#[derive(Clone)]
pub struct MockChannel {
    inner: Arc<Mutex<Inner>>,
    clock: ManualClock,
}

impl MockChannel {
    pub fn new(clock: ManualClock) -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())), clock }
    }

    /// A station that answers identify with `info`, confirm with an ACK and both
    /// history-begin variants with ACKs.
    pub fn station(clock: ManualClock, magic: [u8; 2], latest_index: u16) -> Self {
        let channel = Self::new(clock);
        let info = station_info(magic, latest_index);
        channel.reply_always(0xA6, vec![info]);
        channel.reply_always(0x73, vec![ack(0x73)]);
        channel.reply_always(0x65, vec![ack(0x65)]);
        channel.reply_always(0xB3, vec![ack(0xB3)]);
        channel
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a report to be read once the reply queue is empty.
    pub fn push_report(&self, report: Vec<u8>) {
        self.lock().inbox.push_back(Scripted::Report(report));
    }

    pub fn push_reports<I: IntoIterator<Item = Vec<u8>>>(&self, reports: I) {
        let mut inner = self.lock();
        inner.inbox.extend(reports.into_iter().map(Scripted::Report));
    }

    /// Queue a read failure of the given kind.
    pub fn push_error(&self, kind: ChannelErrorKind) {
        self.lock().inbox.push_back(Scripted::Error(kind));
    }

    /// Answer the next command starting with `command` with `reports`.
    /// One-shot replies queue up and take precedence over standing ones.
    pub fn reply_once(&self, command: u8, reports: Vec<Vec<u8>>) {
        self.lock().once.entry(command).or_default().push_back(reports);
    }

    /// Answer every command starting with `command` with `reports`.
    pub fn reply_always(&self, command: u8, reports: Vec<Vec<u8>>) {
        self.lock().standing.insert(command, reports);
    }

    /// Stop answering commands starting with `command`.
    pub fn silence(&self, command: u8) {
        let mut inner = self.lock();
        inner.standing.remove(&command);
        inner.once.remove(&command);
    }

    /// Fail every read once the clock passes `after`.
    pub fn with_hangup_after(self, after: Duration) -> Self {
        self.lock().hangup_after = Some(after);
        self
    }

    /// Also block the calling thread for `delay` on idle reads. Useful when the
    /// engine runs on a real runtime and should not spin.
    pub fn with_idle_sleep(self, delay: Duration) -> Self {
        self.lock().idle_sleep = Some(delay);
        self
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.lock().events.clone()
    }

    /// Every padded report written, in order.
    pub fn raw_writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                ChannelEvent::Write(bytes) => Some(bytes.clone()),
                ChannelEvent::Read(_) => None,
            })
            .collect()
    }

    /// Number of writes whose report starts with `prefix`.
    pub fn writes_with_prefix(&self, prefix: &[u8]) -> usize {
        self.raw_writes().iter().filter(|w| w.starts_with(prefix)).count()
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    pub fn inbox_len(&self) -> usize {
        let inner = self.lock();
        inner.inbox.len() + inner.pending.len()
    }
}

impl PacketChannel for MockChannel {
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ChannelError> {
        let mut inner = self.lock();

        if let Some(after) = inner.hangup_after {
            if self.clock.elapsed() >= after {
                return Err(ChannelError::other("device unplugged"));
            }
        }

        let next = match inner.pending.pop_front() {
            Some(report) => Some(Scripted::Report(report)),
            None => inner.inbox.pop_front(),
        };

        match next {
            Some(Scripted::Report(report)) => {
                inner.events.push(ChannelEvent::Read(report.first().copied()));
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                // Hardware always delivers whole reports.
                let full = REPORT_LEN.min(buf.len()).max(n);
                buf[n..full].fill(0);
                Ok(full)
            }
            Some(Scripted::Error(kind)) => {
                inner.events.push(ChannelEvent::Read(None));
                Err(match kind {
                    ChannelErrorKind::Timeout => ChannelError::timeout(),
                    ChannelErrorKind::NoData => ChannelError::no_data(),
                    ChannelErrorKind::Other => ChannelError::other("scripted failure"),
                })
            }
            None => {
                inner.events.push(ChannelEvent::Read(None));
                let idle_sleep = inner.idle_sleep;
                drop(inner);
                if let Some(delay) = idle_sleep {
                    std::thread::sleep(delay);
                }
                self.clock.advance(timeout);
                Err(ChannelError::timeout())
            }
        }
    }

    fn write_report(&mut self, report: &[u8]) -> Result<usize, ChannelError> {
        let mut inner = self.lock();
        inner.events.push(ChannelEvent::Write(report.to_vec()));

        if let Some(&command) = report.first() {
            let once = inner.once.get_mut(&command).and_then(VecDeque::pop_front);
            let replies = once.or_else(|| inner.standing.get(&command).cloned());
            if let Some(replies) = replies {
                inner.pending.extend(replies);
            }
        }
        Ok(report.len())
    }

    fn close(&mut self) {
        self.lock().close_count += 1;
    }
}

/// Encoded station identity frame.
pub fn station_info(magic: [u8; 2], latest_index: u16) -> Vec<u8> {
    Frame::StationInfo(StationInfo {
        model: *b"WMR200\0\0",
        firmware: [0x01, 0x02],
        magic,
        latest_index,
    })
    .encode()
}

/// Encoded acknowledgment of `command`.
pub fn ack(command: u8) -> Vec<u8> {
    Frame::Ack(Ack { command }).encode()
}

/// Encoded climate frame for one channel, temperature in raw tenths.
pub fn climate(channel: u8, tenths: i16) -> Vec<u8> {
    Frame::Climate(ClimateFrame {
        timestamp: None,
        channel,
        temperature: tenths.to_be_bytes(),
        humidity: 50,
        dewpoint: [0x00, 0x64],
        heat_index: tenths.to_be_bytes(),
    })
    .encode()
}

/// Timestamp `minutes` after 2024-06-01 00:00.
pub fn minutes_after_base(minutes: i64) -> Option<DateTime> {
    let base = DateTime::new(2024, 6, 1, 0, 0, 0, 0).ok()?;
    base.checked_add(jiff::Span::new().minutes(minutes)).ok()
}

/// History record with plausible readings.
pub fn history_record(index: u16, timestamp: Option<DateTime>) -> HistoryRecord {
    HistoryRecord {
        index,
        timestamp,
        temperature: [[0x00, 0xD9]; SENSOR_CHANNELS],
        humidity: [55; SENSOR_CHANNELS],
        dewpoint: [0x00, 0x64],
        heat_index: [0x00, 0xD9],
        windchill: [0x00, 0xD9],
        gust_speed: [0x00, 0x20],
        gust_dir: [0x00, 0x5A],
        avg_speed: [0x00, 0x10],
        avg_dir: [0x00, 0x5A],
        rain_hour: [0x00, 0x00],
        rain_total: [0x04, 0xB0],
        rain_rate: [0x00, 0x00],
        pressure: [0x27, 0xAE],
        sea_level: [0x27, 0xC0],
    }
}

/// Head and continuation reports for one history record.
pub fn history_reports(record: HistoryRecord) -> [Vec<u8>; 2] {
    let (head, tail) = codec::split_history(&Frame::History(record).encode());
    [head, tail]
}

/// Reports for consecutive records `first..first + count`, five minutes apart.
pub fn history_run(first: u16, count: u16, first_minute: i64) -> Vec<Vec<u8>> {
    (0..count)
        .flat_map(|i| {
            let ts = minutes_after_base(first_minute + 5 * i64::from(i));
            history_reports(history_record(first + i, ts))
        })
        .collect()
}
