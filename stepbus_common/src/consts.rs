//! System-wide constants shared across stepbus crates.
//!
//! Motor timing defaults match a geared unipolar stepper (28BYJ-48 class)
//! driven half-stepped through a darlington array: 4096 steps per
//! output-shaft revolution at 1.2 ms per step.

/// Width of one motor's excitation field in the shared register, in bits.
pub const FIELD_BITS: u32 = 4;

/// Widest supported shift register chain, in bits.
pub const MAX_REGISTER_BITS: u32 = 32;

/// Default shift register width: one 8-bit register, two motors.
pub const DEFAULT_REGISTER_BITS: u32 = 8;

/// Default step count for a full output-shaft revolution, half-stepped.
pub const DEFAULT_STEPS_PER_REV: u32 = 4096;

/// Default delay between consecutive motor steps, in microseconds.
pub const DEFAULT_STEP_DELAY_US: u64 = 1200;

/// Default spin-up delay before a rotation's step loop begins, in
/// microseconds.
pub const DEFAULT_SPINUP_DELAY_US: u64 = 100_000;
