//! Iqstream - duplex IQ sample streaming for SDR front ends
//!
//! This library keeps a software-defined-radio front end continuously fed
//! (transmit) or continuously drained (receive) while upper-layer DSP runs
//! inside simple per-block callbacks. It provides:
//! - an owned per-direction front-end abstraction ([`TxFrontEnd`] /
//!   [`RxFrontEnd`])
//! - a thread-per-direction streaming engine with clean start/stop
//!   semantics ([`StreamEngine`])
//! - lock-free counters and an event channel for underrun/overrun and
//!   partial-transfer reporting ([`StreamMonitor`])
//! - a hardware-free loopback front end for tests and demos ([`sim`])
//!
//! The engine never buffers beyond one reusable block per direction:
//! within a direction, hardware transfer and callback strictly alternate.
//!
//! ```
//! use iqstream::{sim, SinkStatus, StreamEngine, ToneSource, Sample};
//!
//! let (tx, rx) = sim::loopback_pair(1 << 14);
//! let mut engine = StreamEngine::new(tx, rx);
//!
//! let tone = ToneSource::new(1_000.0, 250_000.0, 0.5);
//! engine.start_tx(0, tone).unwrap();
//! engine
//!     .start_rx(0, |_samples: &[Sample]| SinkStatus::Continue)
//!     .unwrap();
//!
//! engine.stop_rx().unwrap();
//! engine.stop_tx().unwrap();
//! ```

pub mod config;
pub mod radio;

pub use config::RadioConfig;
pub use radio::callback::{SampleSink, SampleSource, SinkStatus};
pub use radio::engine::{StreamEngine, StreamError};
pub use radio::frontend::{Direction, FrontEndError, RxFrontEnd, TransferOutcome, TxFrontEnd};
pub use radio::monitor::{MonitorSnapshot, StreamEvent, StreamMonitor};
pub use radio::sim;
pub use radio::sim::ToneSource;

/// One complex baseband sample (I/Q pair).
pub type Sample = num_complex::Complex32;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default transfer block length in samples, per direction
pub const DEFAULT_BUFFER_LEN: usize = 512;
