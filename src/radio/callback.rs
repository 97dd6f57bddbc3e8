//! Producer/consumer callback contract
//!
//! The engine invokes a user-supplied callback once per loop iteration, on
//! the worker thread for that direction. Callbacks must not block: a stalled
//! producer starves the transmit hardware (underrun) and a stalled consumer
//! lets the receive hardware overwrite samples (overrun). The engine cannot
//! prevent either; it only reports them.
//!
//! Per-invocation context (counters, demodulator state, whatever the DSP
//! layer needs) is captured by the closure or held in the implementing type.
//! There is no separate userdata pointer and no global state.

use crate::Sample;

/// Status returned by a [`SampleSink`] after each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// Block processed; keep streaming.
    Continue,
    /// The sink failed to process the block. Logged and counted by the
    /// engine; the stream keeps running. Only `stop` or a hardware fault
    /// terminates a loop.
    Error,
}

/// Produces blocks of samples to transmit.
///
/// Called once per transmit iteration with the engine's reusable transfer
/// buffer; the implementation fills the whole slice.
pub trait SampleSource: Send {
    fn fill(&mut self, buffer: &mut [Sample]);
}

impl<F> SampleSource for F
where
    F: FnMut(&mut [Sample]) + Send,
{
    fn fill(&mut self, buffer: &mut [Sample]) {
        self(buffer)
    }
}

/// Consumes blocks of samples just received.
///
/// Called once per receive iteration with exactly the samples the hardware
/// reported valid - never the buffer's full capacity after a partial read.
pub trait SampleSink: Send {
    fn consume(&mut self, samples: &[Sample]) -> SinkStatus;
}

impl<F> SampleSink for F
where
    F: FnMut(&[Sample]) -> SinkStatus + Send,
{
    fn consume(&mut self, samples: &[Sample]) -> SinkStatus {
        self(samples)
    }
}
