//! Simulated loopback front end
//!
//! `loopback_pair` wires a transmit half to a receive half through a
//! lock-free SPSC ring: whatever the tx worker writes comes back out of the
//! rx worker's reads. The pair models the behaviors the engine has to cope
//! with - blocking reads with bounded patience, partial transfers under
//! backpressure, overrun when the ring overflows, faults on use of a
//! stopped channel - without touching hardware.
//!
//! Capability limits mimic a single-channel transceiver: a fixed tunable
//! range, a bounded gain range, and an even decimation ratio between 4
//! and 256.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::debug;

use crate::radio::callback::SampleSource;
use crate::radio::frontend::{FrontEndError, RxFrontEnd, TransferOutcome, TxFrontEnd};
use crate::Sample;

/// Tunable range of the simulated transceiver.
const TUNE_MIN_HZ: f64 = 50.0e6;
const TUNE_MAX_HZ: f64 = 2.2e9;

/// Gain range in dB.
const GAIN_MIN_DB: f64 = 0.0;
const GAIN_MAX_DB: f64 = 76.0;

/// Decimation must be even and within this range.
const DECIM_MIN: u32 = 4;
const DECIM_MAX: u32 = 256;

/// Poll interval while waiting on the ring.
const POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Polls before a blocked exchange gives up and reports a partial result.
const PATIENCE_POLLS: u32 = 25;

fn check_frequency(hz: f64) -> Result<(), FrontEndError> {
    if (TUNE_MIN_HZ..=TUNE_MAX_HZ).contains(&hz) {
        Ok(())
    } else {
        Err(FrontEndError::UnsupportedCapability(format!(
            "frequency {hz} Hz outside tunable range {TUNE_MIN_HZ}..={TUNE_MAX_HZ}"
        )))
    }
}

fn check_gain(db: f64) -> Result<(), FrontEndError> {
    if (GAIN_MIN_DB..=GAIN_MAX_DB).contains(&db) {
        Ok(())
    } else {
        Err(FrontEndError::UnsupportedCapability(format!(
            "gain {db} dB outside range {GAIN_MIN_DB}..={GAIN_MAX_DB}"
        )))
    }
}

fn check_decimation(ratio: u32) -> Result<(), FrontEndError> {
    if (DECIM_MIN..=DECIM_MAX).contains(&ratio) && ratio % 2 == 0 {
        Ok(())
    } else {
        Err(FrontEndError::UnsupportedCapability(format!(
            "decimation {ratio} not an even ratio within {DECIM_MIN}..={DECIM_MAX}"
        )))
    }
}

/// Transmit half of the simulated loopback pair.
pub struct SimTx {
    ring: HeapProd<Sample>,
    overflowed: Arc<AtomicBool>,
    frequency_hz: f64,
    gain_db: f64,
    decimation: u32,
    running: bool,
}

/// Receive half of the simulated loopback pair.
pub struct SimRx {
    ring: HeapCons<Sample>,
    overflowed: Arc<AtomicBool>,
    frequency_hz: f64,
    gain_db: f64,
    decimation: u32,
    running: bool,
}

/// A tx/rx pair joined by a ring of `capacity` samples.
///
/// Defaults match a narrowband UHF setup: 462 MHz, 10 dB, decimation 256.
pub fn loopback_pair(capacity: usize) -> (SimTx, SimRx) {
    let (prod, cons) = HeapRb::<Sample>::new(capacity).split();
    let overflowed = Arc::new(AtomicBool::new(false));
    let tx = SimTx {
        ring: prod,
        overflowed: Arc::clone(&overflowed),
        frequency_hz: 462.0e6,
        gain_db: 10.0,
        decimation: 256,
        running: false,
    };
    let rx = SimRx {
        ring: cons,
        overflowed,
        frequency_hz: 462.0e6,
        gain_db: 10.0,
        decimation: 256,
        running: false,
    };
    (tx, rx)
}

impl TxFrontEnd for SimTx {
    fn set_frequency(&mut self, hz: f64) -> Result<(), FrontEndError> {
        check_frequency(hz)?;
        self.frequency_hz = hz;
        Ok(())
    }

    fn frequency(&self) -> f64 {
        self.frequency_hz
    }

    fn set_gain(&mut self, db: f64) -> Result<(), FrontEndError> {
        check_gain(db)?;
        self.gain_db = db;
        Ok(())
    }

    fn gain(&self) -> f64 {
        self.gain_db
    }

    fn set_decimation(&mut self, ratio: u32) -> Result<(), FrontEndError> {
        check_decimation(ratio)?;
        self.decimation = ratio;
        Ok(())
    }

    fn decimation(&self) -> u32 {
        self.decimation
    }

    fn start(&mut self) -> Result<(), FrontEndError> {
        debug!("sim tx started");
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), FrontEndError> {
        debug!("sim tx stopped");
        self.running = false;
        Ok(())
    }

    fn write(&mut self, samples: &[Sample]) -> Result<TransferOutcome, FrontEndError> {
        if !self.running {
            return Err(FrontEndError::HardwareFault(
                "write on a stopped tx channel".into(),
            ));
        }
        let mut polls = 0;
        loop {
            let accepted = self.ring.push_slice(samples);
            if accepted > 0 || polls >= PATIENCE_POLLS {
                if accepted > 0 && accepted < samples.len() {
                    // the tail was dropped, the reader will see a gap
                    self.overflowed.store(true, Ordering::Release);
                }
                return Ok(TransferOutcome {
                    count: accepted,
                    discontinuity: false,
                });
            }
            thread::sleep(POLL_INTERVAL);
            polls += 1;
        }
    }
}

impl RxFrontEnd for SimRx {
    fn set_frequency(&mut self, hz: f64) -> Result<(), FrontEndError> {
        check_frequency(hz)?;
        self.frequency_hz = hz;
        Ok(())
    }

    fn frequency(&self) -> f64 {
        self.frequency_hz
    }

    fn set_gain(&mut self, db: f64) -> Result<(), FrontEndError> {
        check_gain(db)?;
        self.gain_db = db;
        Ok(())
    }

    fn gain(&self) -> f64 {
        self.gain_db
    }

    fn set_decimation(&mut self, ratio: u32) -> Result<(), FrontEndError> {
        check_decimation(ratio)?;
        self.decimation = ratio;
        Ok(())
    }

    fn decimation(&self) -> u32 {
        self.decimation
    }

    fn start(&mut self) -> Result<(), FrontEndError> {
        debug!("sim rx started");
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), FrontEndError> {
        debug!("sim rx stopped");
        self.running = false;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [Sample]) -> Result<TransferOutcome, FrontEndError> {
        if !self.running {
            return Err(FrontEndError::HardwareFault(
                "read on a stopped rx channel".into(),
            ));
        }
        let mut polls = 0;
        loop {
            let filled = self.ring.pop_slice(buffer);
            if filled > 0 || polls >= PATIENCE_POLLS {
                let overrun = self.overflowed.swap(false, Ordering::AcqRel);
                return Ok(TransferOutcome {
                    count: filled,
                    discontinuity: overrun,
                });
            }
            thread::sleep(POLL_INTERVAL);
            polls += 1;
        }
    }
}

/// Rotating-phasor producer: a complex tone at a fixed baseband frequency.
pub struct ToneSource {
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl ToneSource {
    pub fn new(tone_hz: f32, sample_rate_hz: f32, amplitude: f32) -> Self {
        Self {
            phase: 0.0,
            step: std::f32::consts::TAU * tone_hz / sample_rate_hz,
            amplitude,
        }
    }
}

impl SampleSource for ToneSource {
    fn fill(&mut self, buffer: &mut [Sample]) {
        for slot in buffer.iter_mut() {
            *slot = Sample::from_polar(self.amplitude, self.phase);
            self.phase += self.step;
            if self.phase >= std::f32::consts::TAU {
                self.phase -= std::f32::consts::TAU;
            }
        }
    }
}
