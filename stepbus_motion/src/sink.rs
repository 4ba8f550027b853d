//! Shift register sink: the hardware output boundary.
//!
//! A [`ShiftSink`] stands for the bit-banged shift-and-latch chain that
//! actually drives the coils. The motion core treats it as a blocking,
//! side-effecting write of the full combined register value.
//!
//! # Wire contract
//!
//! [`ShiftSink::write`] transmits `width_bits` bits of `value` LSB-first:
//! bit 0 is shifted out first and lands furthest from the serial input once
//! the latch pulses. Implementations perform no internal locking; the
//! register bus mutex is the only serialization, so a sink is never entered
//! by two callers at once.

use thiserror::Error;

/// Error type for sink operations.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// The transmission or latch pulse failed.
    #[error("shift register write failed: {0}")]
    WriteFailed(String),

    /// The requested width exceeds what this sink can drive.
    #[error("unsupported register width: {width_bits} bits (sink limit {max_bits})")]
    UnsupportedWidth {
        /// Width the caller asked for.
        width_bits: u32,
        /// Widest chain the sink supports.
        max_bits: u32,
    },
}

/// Hardware output boundary for one shift register chain.
///
/// Implementations are dumb transports: no locking, no retries, no caching.
/// A failed [`write`](ShiftSink::write) must leave the latch un-pulsed so
/// the previously latched value keeps driving the outputs.
pub trait ShiftSink: Send {
    /// Sink identifier (e.g. "simulation").
    fn name(&self) -> &'static str;

    /// Serialize `width_bits` bits of `value` LSB-first, then latch.
    ///
    /// # Errors
    /// Returns `SinkError` if the transmission fails; the previously
    /// latched value must remain in effect.
    fn write(&mut self, value: u32, width_bits: u32) -> Result<(), SinkError>;

    /// Release hardware resources. Called once during orderly shutdown.
    ///
    /// # Errors
    /// Returns `SinkError` if teardown fails; callers log and continue.
    fn shutdown(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
