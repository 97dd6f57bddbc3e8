//! Front-end channel abstraction
//!
//! The radio hardware is modeled as two independently owned halves, one per
//! streaming direction. A physical device that shares tuning state between
//! directions hides that sharing behind the two halves; the engine only ever
//! sees exclusive ownership, which is what lets each worker thread drive its
//! half without locking.

use std::fmt;

use thiserror::Error;

use crate::Sample;

/// Streaming direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Transmit path: samples flow from the process to the front end.
    Tx,
    /// Receive path: samples flow from the front end to the process.
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => write!(f, "tx"),
            Direction::Rx => write!(f, "rx"),
        }
    }
}

/// Errors reported by a front-end channel
#[derive(Error, Debug)]
pub enum FrontEndError {
    /// The hardware cannot honor a configuration request (for example a
    /// frequency outside the tunable range). Recoverable; the stream stays
    /// idle and the caller may retry with different parameters.
    #[error("front end cannot honor request: {0}")]
    UnsupportedCapability(String),

    /// The hardware returned an invalid outcome. Fatal to the stream that
    /// observed it; the affected loop terminates and the fault is surfaced
    /// through `stop`.
    #[error("hardware fault: {0}")]
    HardwareFault(String),
}

/// Outcome of one hardware exchange.
///
/// Moving fewer samples than requested is a partial transfer, not an error;
/// the next loop iteration naturally retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Samples actually accepted (tx) or filled (rx).
    pub count: usize,
    /// Underrun (tx) or overrun (rx) observed since the previous exchange.
    pub discontinuity: bool,
}

impl TransferOutcome {
    /// Full transfer of `count` samples with no discontinuity.
    pub fn clean(count: usize) -> Self {
        Self {
            count,
            discontinuity: false,
        }
    }
}

/// Transmit half of a front end.
///
/// Configuration calls are synchronous and take effect before the next
/// `start`. `write` blocks until the hardware accepts the block, bounded by
/// hardware timing.
pub trait TxFrontEnd: Send {
    fn set_frequency(&mut self, hz: f64) -> Result<(), FrontEndError>;
    fn frequency(&self) -> f64;

    fn set_gain(&mut self, db: f64) -> Result<(), FrontEndError>;
    fn gain(&self) -> f64;

    fn set_decimation(&mut self, ratio: u32) -> Result<(), FrontEndError>;
    fn decimation(&self) -> u32;

    /// Begin continuous transmission.
    fn start(&mut self) -> Result<(), FrontEndError>;

    /// End continuous transmission and release hardware streaming state.
    fn stop(&mut self) -> Result<(), FrontEndError>;

    /// Push one block to the hardware. Reports how many samples were
    /// accepted and whether the hardware ran dry waiting for data.
    fn write(&mut self, samples: &[Sample]) -> Result<TransferOutcome, FrontEndError>;
}

/// Receive half of a front end.
///
/// Mirror image of [`TxFrontEnd`]; `read` blocks until samples are
/// available, bounded by hardware timing.
pub trait RxFrontEnd: Send {
    fn set_frequency(&mut self, hz: f64) -> Result<(), FrontEndError>;
    fn frequency(&self) -> f64;

    fn set_gain(&mut self, db: f64) -> Result<(), FrontEndError>;
    fn gain(&self) -> f64;

    fn set_decimation(&mut self, ratio: u32) -> Result<(), FrontEndError>;
    fn decimation(&self) -> u32;

    /// Begin continuous reception.
    fn start(&mut self) -> Result<(), FrontEndError>;

    /// End continuous reception and release hardware streaming state.
    fn stop(&mut self) -> Result<(), FrontEndError>;

    /// Pull one block from the hardware, filling `buffer` up to its length.
    /// Reports how many samples are valid and whether the hardware dropped
    /// samples before they could be read.
    fn read(&mut self, buffer: &mut [Sample]) -> Result<TransferOutcome, FrontEndError>;
}
