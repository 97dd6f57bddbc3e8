//! Integration tests for the duplex streaming engine
//!
//! The hardware collaborator is replaced by scripted fakes so every
//! transfer outcome - full, partial, underrun/overrun, blocking, fault -
//! can be injected deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use iqstream::{
    Direction, FrontEndError, RxFrontEnd, Sample, SinkStatus, StreamEngine, StreamError,
    TransferOutcome, TxFrontEnd,
};

/// One scripted hardware exchange. Exhausted scripts fall back to `Full`.
#[derive(Debug, Clone)]
enum Step {
    Full,
    Partial(usize),
    Discontinuity,
    Fault,
    Block(Duration),
}

#[derive(Clone)]
struct FakeTx {
    steps: Arc<Mutex<VecDeque<Step>>>,
    writes: Arc<AtomicUsize>,
    concurrent: Arc<AtomicUsize>,
    max_concurrent: Arc<AtomicUsize>,
    started: Arc<AtomicBool>,
    pace: Duration,
    frequency: f64,
    gain: f64,
    decimation: u32,
}

impl FakeTx {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            writes: Arc::new(AtomicUsize::new(0)),
            concurrent: Arc::new(AtomicUsize::new(0)),
            max_concurrent: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(AtomicBool::new(false)),
            pace: Duration::from_micros(50),
            frequency: 462.0e6,
            gain: 10.0,
            decimation: 256,
        }
    }
}

impl TxFrontEnd for FakeTx {
    fn set_frequency(&mut self, hz: f64) -> Result<(), FrontEndError> {
        if hz > 6.0e9 {
            return Err(FrontEndError::UnsupportedCapability(format!(
                "frequency {hz} Hz"
            )));
        }
        self.frequency = hz;
        Ok(())
    }

    fn frequency(&self) -> f64 {
        self.frequency
    }

    fn set_gain(&mut self, db: f64) -> Result<(), FrontEndError> {
        self.gain = db;
        Ok(())
    }

    fn gain(&self) -> f64 {
        self.gain
    }

    fn set_decimation(&mut self, ratio: u32) -> Result<(), FrontEndError> {
        self.decimation = ratio;
        Ok(())
    }

    fn decimation(&self) -> u32 {
        self.decimation
    }

    fn start(&mut self) -> Result<(), FrontEndError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), FrontEndError> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn write(&mut self, samples: &[Sample]) -> Result<TransferOutcome, FrontEndError> {
        let inflight = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(inflight, Ordering::SeqCst);
        thread::sleep(self.pace);

        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Full);
        let outcome = match step {
            Step::Full => Ok(TransferOutcome::clean(samples.len())),
            Step::Partial(count) => Ok(TransferOutcome::clean(count)),
            Step::Discontinuity => Ok(TransferOutcome {
                count: samples.len(),
                discontinuity: true,
            }),
            Step::Fault => Err(FrontEndError::HardwareFault("scripted tx fault".into())),
            Step::Block(delay) => {
                thread::sleep(delay);
                Ok(TransferOutcome::clean(samples.len()))
            }
        };

        self.writes.fetch_add(1, Ordering::SeqCst);
        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[derive(Clone)]
struct FakeRx {
    steps: Arc<Mutex<VecDeque<Step>>>,
    reads: Arc<AtomicUsize>,
    started: Arc<AtomicBool>,
    pace: Duration,
    frequency: f64,
    gain: f64,
    decimation: u32,
}

impl FakeRx {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            reads: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(AtomicBool::new(false)),
            pace: Duration::from_micros(50),
            frequency: 462.0e6,
            gain: 10.0,
            decimation: 256,
        }
    }
}

impl RxFrontEnd for FakeRx {
    fn set_frequency(&mut self, hz: f64) -> Result<(), FrontEndError> {
        self.frequency = hz;
        Ok(())
    }

    fn frequency(&self) -> f64 {
        self.frequency
    }

    fn set_gain(&mut self, db: f64) -> Result<(), FrontEndError> {
        self.gain = db;
        Ok(())
    }

    fn gain(&self) -> f64 {
        self.gain
    }

    fn set_decimation(&mut self, ratio: u32) -> Result<(), FrontEndError> {
        self.decimation = ratio;
        Ok(())
    }

    fn decimation(&self) -> u32 {
        self.decimation
    }

    fn start(&mut self) -> Result<(), FrontEndError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), FrontEndError> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [Sample]) -> Result<TransferOutcome, FrontEndError> {
        thread::sleep(self.pace);
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Full);
        let outcome = match step {
            Step::Full => {
                buffer.fill(Sample::new(1.0, -1.0));
                Ok(TransferOutcome::clean(buffer.len()))
            }
            Step::Partial(count) => {
                buffer[..count].fill(Sample::new(1.0, -1.0));
                Ok(TransferOutcome::clean(count))
            }
            Step::Discontinuity => {
                buffer.fill(Sample::new(1.0, -1.0));
                Ok(TransferOutcome {
                    count: buffer.len(),
                    discontinuity: true,
                })
            }
            Step::Fault => Err(FrontEndError::HardwareFault("scripted rx fault".into())),
            Step::Block(delay) => {
                thread::sleep(delay);
                buffer.fill(Sample::new(1.0, -1.0));
                Ok(TransferOutcome::clean(buffer.len()))
            }
        };
        self.reads.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn second_start_while_active_is_rejected_and_loop_uninterrupted() {
    let rx = FakeRx::new(Vec::new());
    let mut engine = StreamEngine::new(FakeTx::new(Vec::new()), rx);
    let monitor = engine.monitor();

    engine
        .start_rx(0, |_: &[Sample]| SinkStatus::Continue)
        .expect("first start");
    assert!(wait_until(Duration::from_secs(5), || {
        monitor.iterations(Direction::Rx) >= 100
    }));

    let err = engine
        .start_rx(0, |_: &[Sample]| SinkStatus::Continue)
        .expect_err("second start must fail");
    assert!(matches!(
        err,
        StreamError::StreamAlreadyActive(Direction::Rx)
    ));

    // the original loop keeps iterating
    let before = monitor.iterations(Direction::Rx);
    assert!(wait_until(Duration::from_secs(5), || {
        monitor.iterations(Direction::Rx) > before
    }));

    engine.stop_rx().expect("clean stop");
}

#[test]
fn consumer_sees_exactly_the_reported_count() {
    let rx = FakeRx::new(vec![Step::Partial(300)]);
    let mut engine = StreamEngine::new(FakeTx::new(Vec::new()), rx);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    engine
        .start_rx(0, move |samples: &[Sample]| {
            sink_seen.lock().unwrap().push(samples.len());
            SinkStatus::Continue
        })
        .expect("start");

    assert!(wait_until(Duration::from_secs(5), || {
        seen.lock().unwrap().len() >= 5
    }));
    engine.stop_rx().expect("clean stop");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], 300, "partial read must surface its exact count");
    assert!(seen.iter().all(|&count| count <= 512));
    assert!(seen[1..].iter().all(|&count| count == 512));
}

#[test]
fn hardware_fault_terminates_loop_and_surfaces_on_stop() {
    let rx = FakeRx::new(vec![Step::Full, Step::Full, Step::Fault]);
    let reads = Arc::clone(&rx.reads);
    let mut engine = StreamEngine::new(FakeTx::new(Vec::new()), rx);
    let monitor = engine.monitor();

    let invocations = Arc::new(AtomicUsize::new(0));
    let sink_invocations = Arc::clone(&invocations);
    engine
        .start_rx(0, move |_: &[Sample]| {
            sink_invocations.fetch_add(1, Ordering::SeqCst);
            SinkStatus::Continue
        })
        .expect("start");

    // the loop exits on its own within the faulting iteration
    assert!(wait_until(Duration::from_secs(5), || !engine.rx_active()));
    assert_eq!(
        invocations.load(Ordering::SeqCst),
        2,
        "callback must never run after the fault"
    );
    assert_eq!(reads.load(Ordering::SeqCst), 3);
    assert_eq!(monitor.iterations(Direction::Rx), 2);
    assert!(monitor.faulted(Direction::Rx));

    let err = engine.stop_rx().expect_err("fault surfaces through stop");
    assert!(matches!(
        err,
        StreamError::FrontEnd(FrontEndError::HardwareFault(_))
    ));
}

#[test]
fn stop_waits_for_the_inflight_transfer_and_releases_hardware() {
    let rx = FakeRx::new(vec![Step::Block(Duration::from_millis(200)); 50]);
    let started = Arc::clone(&rx.started);
    let mut engine = StreamEngine::new(FakeTx::new(Vec::new()), rx);

    engine
        .start_rx(0, |_: &[Sample]| SinkStatus::Continue)
        .expect("start");
    thread::sleep(Duration::from_millis(50)); // worker is inside a blocking read

    let begin = Instant::now();
    engine.stop_rx().expect("clean stop");
    let elapsed = begin.elapsed();

    assert!(
        elapsed >= Duration::from_millis(100),
        "stop returned after {elapsed:?}, before the in-flight transfer finished"
    );
    assert!(
        !started.load(Ordering::SeqCst),
        "hardware must be released before stop returns"
    );
    assert!(!engine.rx_active());
}

#[test]
fn underruns_are_counted_exactly_and_never_terminate_the_loop() {
    let mut steps = vec![Step::Full; 100];
    for index in [10, 25, 40, 55, 70] {
        steps[index] = Step::Discontinuity;
    }
    let tx = FakeTx::new(steps);
    let writes = Arc::clone(&tx.writes);
    let started = Arc::clone(&tx.started);
    let mut engine = StreamEngine::new(tx, FakeRx::new(Vec::new()));
    let monitor = engine.monitor();

    engine
        .start_tx(0, |_: &mut [Sample]| {})
        .expect("start");
    assert!(wait_until(Duration::from_secs(5), || {
        writes.load(Ordering::SeqCst) >= 100
    }));
    engine.stop_tx().expect("underruns are not fatal");

    assert!(!started.load(Ordering::SeqCst), "hardware released on stop");
    assert_eq!(monitor.underruns(), 5);
    assert!(monitor.iterations(Direction::Tx) >= 100);
    assert!(!monitor.faulted(Direction::Tx));
}

#[test]
fn fault_on_one_direction_leaves_the_other_running() {
    let tx = FakeTx::new(Vec::new());
    let rx = FakeRx::new(vec![Step::Fault]);
    let mut engine = StreamEngine::new(tx, rx);
    let monitor = engine.monitor();

    engine
        .start_tx(0, |_: &mut [Sample]| {})
        .expect("start tx");
    engine
        .start_rx(0, |_: &[Sample]| SinkStatus::Continue)
        .expect("start rx");

    assert!(wait_until(Duration::from_secs(5), || !engine.rx_active()));

    let before = monitor.iterations(Direction::Tx);
    assert!(wait_until(Duration::from_secs(5), || {
        monitor.iterations(Direction::Tx) > before
    }));
    assert!(engine.tx_active());

    assert!(engine.stop_rx().is_err());
    engine.stop_tx().expect("tx unaffected by the rx fault");
}

#[test]
fn configure_is_rejected_while_direction_is_active() {
    let mut engine = StreamEngine::new(FakeTx::new(Vec::new()), FakeRx::new(Vec::new()));
    engine
        .start_tx(0, |_: &mut [Sample]| {})
        .expect("start");

    let err = engine
        .configure_tx(&iqstream::RadioConfig::default())
        .expect_err("configure while active");
    assert!(matches!(
        err,
        StreamError::StreamAlreadyActive(Direction::Tx)
    ));

    // the other direction is independent
    engine
        .configure_rx(&iqstream::RadioConfig::default())
        .expect("rx is idle");

    engine.stop_tx().expect("clean stop");
}

#[test]
fn configure_roundtrip_before_start() {
    let mut engine = StreamEngine::new(FakeTx::new(Vec::new()), FakeRx::new(Vec::new()));
    let config = iqstream::RadioConfig {
        frequency_hz: 433.92e6,
        gain_db: 25.0,
        decimation: 32,
        ..Default::default()
    };
    engine.configure_tx(&config).expect("tx configure");
    engine.configure_rx(&config).expect("rx configure");

    let tx = engine.tx_channel().expect("tx idle");
    assert_eq!(tx.frequency(), 433.92e6);
    assert_eq!(tx.gain(), 25.0);
    assert_eq!(tx.decimation(), 32);
    let rx = engine.rx_channel().expect("rx idle");
    assert_eq!(rx.frequency(), 433.92e6);
}

#[test]
fn fuzzed_start_stop_ordering_never_overlaps_workers() {
    let tx = FakeTx::new(Vec::new());
    let max_concurrent = Arc::clone(&tx.max_concurrent);
    let mut engine = StreamEngine::new(tx, FakeRx::new(Vec::new()));

    // deterministic xorshift so failures reproduce
    let mut state = 0x243F_6A88_85A3_08D3u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    for _ in 0..200 {
        match next() % 3 {
            0 => {
                let _ = engine.start_tx(0, |_: &mut [Sample]| {});
            }
            1 => {
                engine.stop_tx().expect("no faults scripted");
            }
            _ => thread::sleep(Duration::from_micros((next() % 500) as u64)),
        }
    }
    engine.stop_tx().expect("final stop");

    assert!(
        max_concurrent.load(Ordering::SeqCst) <= 1,
        "two transmit workers overlapped"
    );
}
