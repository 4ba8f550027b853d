//! Prelude module for common re-exports.
//!
//! Consumers can `use stepbus_common::prelude::*;` to get the most
//! important types without listing individual paths.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{
    DEFAULT_REGISTER_BITS, DEFAULT_SPINUP_DELAY_US, DEFAULT_STEP_DELAY_US, DEFAULT_STEPS_PER_REV,
    FIELD_BITS, MAX_REGISTER_BITS,
};
