//! Motion error taxonomy.

use crate::sink::SinkError;
use thiserror::Error;

/// Error types for motion operations.
#[derive(Debug, Clone, Error)]
pub enum MotionError {
    /// Register width is not a positive multiple of the field width, or
    /// exceeds the widest supported chain.
    #[error(
        "invalid register width: {width_bits} bits (must be a positive multiple of {field_bits}, at most {max_bits})"
    )]
    InvalidWidth {
        /// Width the caller asked for.
        width_bits: u32,
        /// Bits per motor field.
        field_bits: u32,
        /// Widest supported chain.
        max_bits: u32,
    },

    /// Adding another motor would overflow the register.
    #[error("register full: {width_bits}-bit chain already holds {allocated} motors")]
    RegisterFull {
        /// Configured chain width.
        width_bits: u32,
        /// Motors already allocated.
        allocated: u32,
    },

    /// A rotation is already in flight on this motor.
    #[error("motor '{motor}' is busy with an in-flight rotation")]
    MotorBusy {
        /// Name of the busy motor.
        motor: String,
    },

    /// No sink driver registered under the requested name.
    #[error("sink driver not found: {0}")]
    DriverNotFound(String),

    /// The shift register transmission failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The rotation thread could not be spawned.
    #[error("failed to spawn rotation thread for motor '{motor}': {reason}")]
    SpawnFailed {
        /// Motor the rotation was issued on.
        motor: String,
        /// OS-level failure description.
        reason: String,
    },

    /// The rotation thread terminated abnormally.
    #[error("rotation thread for motor '{motor}' panicked")]
    RotationPanicked {
        /// Motor whose rotation died.
        motor: String,
    },
}
