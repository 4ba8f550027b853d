//! Rotation supervision and motor construction.
//!
//! [`StepperBank`] is the orchestration point for all motors on one shift
//! register chain: it owns the field allocator, the shared register bus,
//! and the cooperative shutdown flag every rotation thread observes
//! between steps.
//!
//! Shutdown sequence: [`StepperBank::begin_shutdown`] raises the flag,
//! callers join their in-flight [`RotationHandle`]s, then
//! [`StepperBank::de_energize`] latches an all-zero register so no coil is
//! left driven.

use crate::error::MotionError;
use crate::register::{RegisterAllocator, RegisterBus};
use crate::sink::{ShiftSink, SinkError};
use crate::stepper::{MotorProfile, Stepper};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{info, warn};

/// Outcome of one rotation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationReport {
    /// Steps the command asked for.
    pub steps_requested: u32,
    /// Steps actually committed to the register.
    pub steps_taken: u32,
    /// Whether the rotation stopped early on the shutdown flag.
    pub cancelled: bool,
}

impl RotationReport {
    /// Report for a zero-length rotation.
    pub(crate) fn empty() -> Self {
        Self {
            steps_requested: 0,
            steps_taken: 0,
            cancelled: false,
        }
    }
}

#[derive(Debug)]
enum HandleState {
    Completed(RotationReport),
    Running {
        motor: String,
        join: JoinHandle<Result<RotationReport, MotionError>>,
    },
}

/// Joinable handle to one in-flight rotation.
///
/// Zero-length rotations complete inline and carry their report directly;
/// everything else wraps the rotation thread's join handle.
#[derive(Debug)]
pub struct RotationHandle {
    state: HandleState,
}

impl RotationHandle {
    pub(crate) fn completed(report: RotationReport) -> Self {
        Self {
            state: HandleState::Completed(report),
        }
    }

    pub(crate) fn spawned(
        motor: String,
        join: JoinHandle<Result<RotationReport, MotionError>>,
    ) -> Self {
        Self {
            state: HandleState::Running { motor, join },
        }
    }

    /// Whether the rotation has finished.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Completed(_) => true,
            HandleState::Running { join, .. } => join.is_finished(),
        }
    }

    /// Block until the rotation finishes and return its report.
    ///
    /// # Errors
    /// Surfaces the rotation's own error, or
    /// `MotionError::RotationPanicked` if the thread died.
    pub fn join(self) -> Result<RotationReport, MotionError> {
        match self.state {
            HandleState::Completed(report) => Ok(report),
            HandleState::Running { motor, join } => join
                .join()
                .map_err(|_| MotionError::RotationPanicked { motor })?,
        }
    }
}

/// All motors on one shift register chain.
pub struct StepperBank {
    bus: Arc<RegisterBus>,
    allocator: RegisterAllocator,
    shutdown: Arc<AtomicBool>,
}

impl StepperBank {
    /// Create a bank driving `sink` through a `width_bits`-bit register.
    ///
    /// # Errors
    /// Returns `MotionError::InvalidWidth` for an unusable width.
    pub fn new(sink: Box<dyn ShiftSink>, width_bits: u32) -> Result<Self, MotionError> {
        let allocator = RegisterAllocator::new(width_bits)?;
        info!(width_bits, sink = sink.name(), "register bus ready");
        Ok(Self {
            bus: Arc::new(RegisterBus::new(sink, width_bits)),
            allocator,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Add the next motor in wiring order.
    ///
    /// Draws the next contiguous 4-bit field: the first motor added sits
    /// at bit 0 of the chain.
    ///
    /// # Errors
    /// Returns `MotionError::RegisterFull` when the chain is exhausted.
    pub fn add_motor(&mut self, name: &str, profile: MotorProfile) -> Result<Stepper, MotionError> {
        let field = self.allocator.allocate()?;
        info!(motor = name, offset = field.offset(), "motor added");
        Ok(Stepper::new(
            name.to_string(),
            field,
            Arc::clone(&self.bus),
            profile,
            Arc::clone(&self.shutdown),
        ))
    }

    /// Snapshot of the cached register value.
    pub fn register_value(&self) -> u32 {
        self.bus.value()
    }

    /// Number of motor fields still available on the chain.
    pub fn remaining_fields(&self) -> u32 {
        self.allocator.remaining()
    }

    /// The cooperative shutdown flag observed between steps.
    ///
    /// Hand a clone to signal handlers; storing `true` stops every
    /// in-flight rotation at its next step boundary.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Raise the shutdown flag.
    pub fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Latch an all-zero register and shut the sink down.
    ///
    /// Call after in-flight rotations have been joined; a rotation still
    /// stepping would re-energize its coils on its next commit.
    ///
    /// # Errors
    /// Propagates the sink's `SinkError` from the zero write or teardown.
    pub fn de_energize(&self) -> Result<(), SinkError> {
        if let Err(e) = self.bus.clear() {
            warn!(error = %e, "de-energize write failed");
            return Err(e);
        }
        self.bus.shutdown_sink()
    }
}
