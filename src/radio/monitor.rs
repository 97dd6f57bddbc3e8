//! Stream counters and event reporting
//!
//! In-loop events (partial transfers, underrun, overrun) are reported here
//! rather than thrown across the loop boundary: the loops keep running, the
//! caller observes. Counters are lock-free and never miss an occurrence.
//! Events additionally go out over a bounded channel with `try_send`, so a
//! slow observer drops events but never stalls a worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;

use crate::radio::frontend::Direction;

/// Depth of the event queue shared by both workers.
const EVENT_QUEUE_DEPTH: usize = 256;

/// One observable event from a streaming loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A direction transitioned Idle -> Active.
    Started(Direction),
    /// A direction transitioned Active -> Idle through `stop`.
    Stopped(Direction),
    /// Transmit hardware ran dry waiting for samples.
    Underrun,
    /// Receive hardware dropped samples before they were read.
    Overrun,
    /// A hardware exchange moved fewer samples than requested.
    PartialTransfer {
        direction: Direction,
        requested: usize,
        transferred: usize,
    },
    /// A hardware fault terminated a direction's loop.
    Fault(Direction),
}

/// Lock-free counters shared between the engine, its workers and the caller.
#[derive(Debug)]
pub struct StreamMonitor {
    tx_iterations: AtomicU64,
    rx_iterations: AtomicU64,
    underruns: AtomicU64,
    overruns: AtomicU64,
    tx_partials: AtomicU64,
    rx_partials: AtomicU64,
    tx_faulted: AtomicBool,
    rx_faulted: AtomicBool,
    events: Sender<StreamEvent>,
}

impl StreamMonitor {
    pub(crate) fn new() -> (Self, Receiver<StreamEvent>) {
        let (events, receiver) = bounded(EVENT_QUEUE_DEPTH);
        let monitor = Self {
            tx_iterations: AtomicU64::new(0),
            rx_iterations: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            tx_partials: AtomicU64::new(0),
            rx_partials: AtomicU64::new(0),
            tx_faulted: AtomicBool::new(false),
            rx_faulted: AtomicBool::new(false),
            events,
        };
        (monitor, receiver)
    }

    fn emit(&self, event: StreamEvent) {
        // lossy on purpose; counters carry the ground truth
        let _ = self.events.try_send(event);
    }

    pub(crate) fn record_started(&self, direction: Direction) {
        match direction {
            Direction::Tx => self.tx_faulted.store(false, Ordering::Release),
            Direction::Rx => self.rx_faulted.store(false, Ordering::Release),
        }
        self.emit(StreamEvent::Started(direction));
    }

    pub(crate) fn record_stopped(&self, direction: Direction) {
        self.emit(StreamEvent::Stopped(direction));
    }

    pub(crate) fn record_iteration(&self, direction: Direction) {
        match direction {
            Direction::Tx => self.tx_iterations.fetch_add(1, Ordering::Relaxed),
            Direction::Rx => self.rx_iterations.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
        self.emit(StreamEvent::Underrun);
    }

    pub(crate) fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
        self.emit(StreamEvent::Overrun);
    }

    pub(crate) fn record_partial(&self, direction: Direction, requested: usize, transferred: usize) {
        match direction {
            Direction::Tx => self.tx_partials.fetch_add(1, Ordering::Relaxed),
            Direction::Rx => self.rx_partials.fetch_add(1, Ordering::Relaxed),
        };
        self.emit(StreamEvent::PartialTransfer {
            direction,
            requested,
            transferred,
        });
    }

    pub(crate) fn record_fault(&self, direction: Direction) {
        match direction {
            Direction::Tx => self.tx_faulted.store(true, Ordering::Release),
            Direction::Rx => self.rx_faulted.store(true, Ordering::Release),
        }
        self.emit(StreamEvent::Fault(direction));
    }

    /// Successful loop iterations for a direction.
    pub fn iterations(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Tx => self.tx_iterations.load(Ordering::Relaxed),
            Direction::Rx => self.rx_iterations.load(Ordering::Relaxed),
        }
    }

    /// Transmit underruns observed so far.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Receive overruns observed so far.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Partial transfers observed so far for a direction.
    pub fn partials(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Tx => self.tx_partials.load(Ordering::Relaxed),
            Direction::Rx => self.rx_partials.load(Ordering::Relaxed),
        }
    }

    /// Whether the last run of a direction ended in a hardware fault.
    pub fn faulted(&self, direction: Direction) -> bool {
        match direction {
            Direction::Tx => self.tx_faulted.load(Ordering::Acquire),
            Direction::Rx => self.rx_faulted.load(Ordering::Acquire),
        }
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            taken_at: Utc::now(),
            tx_iterations: self.tx_iterations.load(Ordering::Relaxed),
            rx_iterations: self.rx_iterations.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            tx_partials: self.tx_partials.load(Ordering::Relaxed),
            rx_partials: self.rx_partials.load(Ordering::Relaxed),
            tx_faulted: self.tx_faulted.load(Ordering::Acquire),
            rx_faulted: self.rx_faulted.load(Ordering::Acquire),
        }
    }
}

/// Serializable snapshot of the stream counters.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Successful transmit iterations
    pub tx_iterations: u64,
    /// Successful receive iterations
    pub rx_iterations: u64,
    /// Transmit underruns
    pub underruns: u64,
    /// Receive overruns
    pub overruns: u64,
    /// Partial transmit transfers
    pub tx_partials: u64,
    /// Partial receive transfers
    pub rx_partials: u64,
    /// Last transmit run ended in a fault
    pub tx_faulted: bool,
    /// Last receive run ended in a fault
    pub rx_faulted: bool,
}
