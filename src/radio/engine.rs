//! Thread-per-direction streaming engine
//!
//! One worker thread per active direction runs a tight transfer/callback
//! loop against its exclusively owned front-end half and a single reusable
//! transfer buffer. Within a direction, hardware transfer and callback
//! strictly alternate; across directions the loops progress independently.
//!
//! Cancellation is cooperative: `stop` clears the direction's active flag,
//! joins the worker (which finishes any in-flight hardware transfer and
//! releases hardware streaming state first), and only then returns. A stuck
//! callback or a stuck hardware call therefore delays `stop` indefinitely;
//! the engine does not mask that with a forced timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::RadioConfig;
use crate::radio::callback::{SampleSink, SampleSource, SinkStatus};
use crate::radio::frontend::{Direction, FrontEndError, RxFrontEnd, TxFrontEnd};
use crate::radio::monitor::{StreamEvent, StreamMonitor};
use crate::{Sample, DEFAULT_BUFFER_LEN};

/// Errors returned by the streaming engine's lifecycle surface
#[derive(Error, Debug)]
pub enum StreamError {
    /// Only channel 0 is wired; any other index is rejected before any
    /// resource is touched.
    #[error("only channel 0 is supported, got channel {0}")]
    UnsupportedChannel(usize),

    /// A `start` while the direction is already Active, or a `configure`
    /// while its front-end half is inside the worker thread. Caller error;
    /// the running loop is not disturbed.
    #[error("{0} stream is already active")]
    StreamAlreadyActive(Direction),

    /// A front-end error, surfaced synchronously from `configure`/`start`
    /// or carried out of a terminated loop by `stop`.
    #[error(transparent)]
    FrontEnd(#[from] FrontEndError),

    /// The worker thread panicked; its front-end half is lost.
    #[error("{0} worker thread panicked")]
    WorkerPanicked(Direction),
}

/// What a worker hands back when it exits.
struct WorkerExit<C> {
    channel: C,
    buffer: Vec<Sample>,
    result: Result<(), StreamError>,
}

/// Per-direction stream state.
///
/// Idle: `idle` holds the front-end half and its transfer buffer.
/// Active: both live inside the worker thread and `worker` holds the join
/// handle. At most one worker exists per direction; the active flag is the
/// loop's cooperative cancellation point, checked at iteration boundaries.
struct DirectionSlot<C> {
    idle: Option<(C, Vec<Sample>)>,
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<WorkerExit<C>>>,
}

impl<C> DirectionSlot<C> {
    fn new(channel: C, buffer_len: usize) -> Self {
        Self {
            idle: Some((channel, vec![Sample::new(0.0, 0.0); buffer_len])),
            active: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Collect a worker that exited on its own (hardware fault) and surface
    /// its parked result. A live worker is left alone.
    fn reap(&mut self, direction: Direction) -> Result<(), StreamError> {
        if self.worker.is_some() && !self.is_active() {
            if let Some(worker) = self.worker.take() {
                let exit = worker
                    .join()
                    .map_err(|_| StreamError::WorkerPanicked(direction))?;
                self.idle = Some((exit.channel, exit.buffer));
                exit.result?;
            }
        }
        Ok(())
    }

    fn spawn<F>(&mut self, mut channel: C, mut buffer: Vec<Sample>, monitor: &Arc<StreamMonitor>, run: F)
    where
        C: Send + 'static,
        F: FnOnce(&mut C, &mut [Sample], &AtomicBool, &StreamMonitor) -> Result<(), StreamError>
            + Send
            + 'static,
    {
        self.active.store(true, Ordering::Release);
        let active = Arc::clone(&self.active);
        let monitor = Arc::clone(monitor);
        self.worker = Some(thread::spawn(move || {
            let result = run(&mut channel, buffer.as_mut_slice(), &active, monitor.as_ref());
            active.store(false, Ordering::Release);
            WorkerExit {
                channel,
                buffer,
                result,
            }
        }));
    }

    /// Signal the loop, wait for the worker to fully exit, take the half
    /// and buffer back. The worker releases hardware state before exiting,
    /// so reconfiguration is safe once this returns.
    fn finish(&mut self, direction: Direction) -> Result<(), StreamError> {
        self.active.store(false, Ordering::Release);
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let exit = worker
            .join()
            .map_err(|_| StreamError::WorkerPanicked(direction))?;
        self.idle = Some((exit.channel, exit.buffer));
        exit.result
    }
}

impl<C> Drop for DirectionSlot<C> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Duplex streaming engine over one transmit and one receive front-end half.
pub struct StreamEngine<T, R> {
    tx: DirectionSlot<T>,
    rx: DirectionSlot<R>,
    monitor: Arc<StreamMonitor>,
    events: Receiver<StreamEvent>,
    buffer_len: usize,
}

impl<T, R> StreamEngine<T, R>
where
    T: TxFrontEnd,
    R: RxFrontEnd,
{
    /// Engine with the default transfer block length per direction.
    pub fn new(tx: T, rx: R) -> Self {
        Self::with_buffer_len(tx, rx, DEFAULT_BUFFER_LEN)
    }

    /// Engine with an explicit transfer block length. Both buffers are
    /// allocated here, once, and reused for every transfer.
    pub fn with_buffer_len(tx: T, rx: R, buffer_len: usize) -> Self {
        let (monitor, events) = StreamMonitor::new();
        Self {
            tx: DirectionSlot::new(tx, buffer_len),
            rx: DirectionSlot::new(rx, buffer_len),
            monitor: Arc::new(monitor),
            events,
            buffer_len,
        }
    }

    /// Transfer block length in samples, per direction.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Shared counters for both directions.
    pub fn monitor(&self) -> Arc<StreamMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Receiver for the bounded stream-event channel.
    pub fn events(&self) -> Receiver<StreamEvent> {
        self.events.clone()
    }

    /// Whether the transmit direction is Active.
    pub fn tx_active(&self) -> bool {
        self.tx.is_active()
    }

    /// Whether the receive direction is Active.
    pub fn rx_active(&self) -> bool {
        self.rx.is_active()
    }

    /// The transmit half, when Idle. `None` while a transmit worker owns it.
    pub fn tx_channel(&self) -> Option<&T> {
        self.tx.idle.as_ref().map(|(channel, _)| channel)
    }

    /// The receive half, when Idle. `None` while a receive worker owns it.
    pub fn rx_channel(&self) -> Option<&R> {
        self.rx.idle.as_ref().map(|(channel, _)| channel)
    }

    /// Apply frequency, gain and decimation to the transmit half.
    ///
    /// Rejected with [`StreamError::StreamAlreadyActive`] while transmit is
    /// Active: the half is inside the worker thread and reconfiguring
    /// concurrently with transfers is not allowed.
    pub fn configure_tx(&mut self, config: &RadioConfig) -> Result<(), StreamError> {
        self.tx.reap(Direction::Tx)?;
        let Some((channel, _)) = self.tx.idle.as_mut() else {
            return Err(StreamError::StreamAlreadyActive(Direction::Tx));
        };
        channel.set_frequency(config.frequency_hz)?;
        channel.set_gain(config.gain_db)?;
        channel.set_decimation(config.decimation)?;
        Ok(())
    }

    /// Apply frequency, gain and decimation to the receive half. Same
    /// exclusion rule as [`Self::configure_tx`].
    pub fn configure_rx(&mut self, config: &RadioConfig) -> Result<(), StreamError> {
        self.rx.reap(Direction::Rx)?;
        let Some((channel, _)) = self.rx.idle.as_mut() else {
            return Err(StreamError::StreamAlreadyActive(Direction::Rx));
        };
        channel.set_frequency(config.frequency_hz)?;
        channel.set_gain(config.gain_db)?;
        channel.set_decimation(config.decimation)?;
        Ok(())
    }

    /// Start the transmit loop: `producer` fills the transfer buffer, the
    /// hardware sends it, repeat until `stop_tx`.
    pub fn start_tx<P>(&mut self, channel_index: usize, producer: P) -> Result<(), StreamError>
    where
        T: 'static,
        P: SampleSource + 'static,
    {
        if channel_index != 0 {
            return Err(StreamError::UnsupportedChannel(channel_index));
        }
        self.tx.reap(Direction::Tx)?;
        let Some((mut channel, buffer)) = self.tx.idle.take() else {
            return Err(StreamError::StreamAlreadyActive(Direction::Tx));
        };
        if let Err(e) = channel.start() {
            self.tx.idle = Some((channel, buffer));
            return Err(e.into());
        }
        self.tx
            .spawn(channel, buffer, &self.monitor, move |channel, buffer, active, monitor| {
                run_tx_loop(channel, buffer, producer, active, monitor)
            });
        self.monitor.record_started(Direction::Tx);
        info!(buffer_len = self.buffer_len, "tx stream started");
        Ok(())
    }

    /// Start the receive loop: the hardware fills the transfer buffer,
    /// `consumer` gets exactly the valid samples, repeat until `stop_rx`.
    pub fn start_rx<S>(&mut self, channel_index: usize, consumer: S) -> Result<(), StreamError>
    where
        R: 'static,
        S: SampleSink + 'static,
    {
        if channel_index != 0 {
            return Err(StreamError::UnsupportedChannel(channel_index));
        }
        self.rx.reap(Direction::Rx)?;
        let Some((mut channel, buffer)) = self.rx.idle.take() else {
            return Err(StreamError::StreamAlreadyActive(Direction::Rx));
        };
        if let Err(e) = channel.start() {
            self.rx.idle = Some((channel, buffer));
            return Err(e.into());
        }
        self.rx
            .spawn(channel, buffer, &self.monitor, move |channel, buffer, active, monitor| {
                run_rx_loop(channel, buffer, consumer, active, monitor)
            });
        self.monitor.record_started(Direction::Rx);
        info!(buffer_len = self.buffer_len, "rx stream started");
        Ok(())
    }

    /// Stop the transmit loop. Returns once the worker has fully exited and
    /// released hardware streaming state; surfaces any fault that
    /// terminated the loop early. No-op when transmit is Idle.
    pub fn stop_tx(&mut self) -> Result<(), StreamError> {
        if self.tx.worker.is_none() {
            return Ok(());
        }
        let result = self.tx.finish(Direction::Tx);
        self.monitor.record_stopped(Direction::Tx);
        info!("tx stream stopped");
        result
    }

    /// Stop the receive loop; same contract as [`Self::stop_tx`].
    pub fn stop_rx(&mut self) -> Result<(), StreamError> {
        if self.rx.worker.is_none() {
            return Ok(());
        }
        let result = self.rx.finish(Direction::Rx);
        self.monitor.record_stopped(Direction::Rx);
        info!("rx stream stopped");
        result
    }
}

fn run_tx_loop<T, P>(
    channel: &mut T,
    buffer: &mut [Sample],
    mut producer: P,
    active: &AtomicBool,
    monitor: &StreamMonitor,
) -> Result<(), StreamError>
where
    T: TxFrontEnd,
    P: SampleSource,
{
    debug!("tx worker running");
    let mut result = Ok(());
    while active.load(Ordering::Acquire) {
        producer.fill(buffer);
        match channel.write(buffer) {
            Ok(outcome) => {
                if outcome.count < buffer.len() {
                    warn!(
                        requested = buffer.len(),
                        accepted = outcome.count,
                        "partial tx transfer"
                    );
                    monitor.record_partial(Direction::Tx, buffer.len(), outcome.count);
                }
                if outcome.discontinuity {
                    warn!("tx underrun");
                    monitor.record_underrun();
                }
                monitor.record_iteration(Direction::Tx);
            }
            Err(fault) => {
                error!(%fault, "tx transfer failed, terminating stream");
                monitor.record_fault(Direction::Tx);
                result = Err(fault.into());
                break;
            }
        }
    }
    if let Err(stop_err) = channel.stop() {
        if result.is_ok() {
            result = Err(stop_err.into());
        }
    }
    debug!("tx worker exiting");
    result
}

fn run_rx_loop<R, S>(
    channel: &mut R,
    buffer: &mut [Sample],
    mut consumer: S,
    active: &AtomicBool,
    monitor: &StreamMonitor,
) -> Result<(), StreamError>
where
    R: RxFrontEnd,
    S: SampleSink,
{
    debug!("rx worker running");
    let mut result = Ok(());
    while active.load(Ordering::Acquire) {
        match channel.read(buffer) {
            Ok(outcome) => {
                let valid = outcome.count.min(buffer.len());
                if valid < buffer.len() {
                    warn!(
                        requested = buffer.len(),
                        filled = valid,
                        "partial rx transfer"
                    );
                    monitor.record_partial(Direction::Rx, buffer.len(), valid);
                }
                if outcome.discontinuity {
                    warn!("rx overrun");
                    monitor.record_overrun();
                }
                if valid > 0 && consumer.consume(&buffer[..valid]) == SinkStatus::Error {
                    warn!("rx sink reported an error, continuing");
                }
                monitor.record_iteration(Direction::Rx);
            }
            Err(fault) => {
                error!(%fault, "rx transfer failed, terminating stream");
                monitor.record_fault(Direction::Rx);
                result = Err(fault.into());
                break;
            }
        }
    }
    if let Err(stop_err) = channel.stop() {
        if result.is_ok() {
            result = Err(stop_err.into());
        }
    }
    debug!("rx worker exiting");
    result
}
