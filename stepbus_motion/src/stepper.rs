//! Per-motor controller: sequence cursor, accumulated angle, and rotation
//! commands.
//!
//! A [`Stepper`] is a cheap-to-clone handle; clones share the same cursor,
//! angle, and busy flag. Rotations run on their own thread and commit one
//! step at a time through the shared [`RegisterBus`], so several motors can
//! move with overlapping wall-clock time while every individual register
//! update stays atomic.
//!
//! Lock order is fixed: the per-motor state mutex is taken first, the bus
//! mutex inside it. The bus never takes a motor lock, so no cycle exists.
//! All sleeps (spin-up, inter-step delay) happen with no lock held.

use crate::error::MotionError;
use crate::register::{MotorField, RegisterBus};
use crate::sequence::{HALF_STEP_CCW, SEQ_LEN};
use crate::supervisor::{RotationHandle, RotationReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use stepbus_common::consts::{
    DEFAULT_SPINUP_DELAY_US, DEFAULT_STEP_DELAY_US, DEFAULT_STEPS_PER_REV,
};
use tracing::{debug, error, trace};

/// Step direction through the half-step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Forward through the sequence: counter-clockwise rotor motion.
    Ccw,
    /// Backward through the sequence: clockwise rotor motion.
    Cw,
}

impl Direction {
    /// Signed cursor increment for this direction.
    pub fn delta(&self) -> i32 {
        match self {
            Direction::Ccw => 1,
            Direction::Cw => -1,
        }
    }

    /// Direction of a signed angular delta; `None` for zero.
    pub fn from_delta(delta_deg: f64) -> Option<Self> {
        if delta_deg > 0.0 {
            Some(Direction::Ccw)
        } else if delta_deg < 0.0 {
            Some(Direction::Cw)
        } else {
            None
        }
    }
}

/// Mechanical and timing parameters for one motor.
#[derive(Debug, Clone, Copy)]
pub struct MotorProfile {
    /// Steps per full output-shaft revolution.
    pub steps_per_rev: u32,
    /// Delay between consecutive steps.
    pub step_delay: Duration,
    /// Delay before a rotation's step loop begins.
    pub spinup_delay: Duration,
}

impl MotorProfile {
    /// Steps per degree of shaft rotation.
    pub fn steps_per_degree(&self) -> f64 {
        f64::from(self.steps_per_rev) / 360.0
    }
}

impl Default for MotorProfile {
    fn default() -> Self {
        Self {
            steps_per_rev: DEFAULT_STEPS_PER_REV,
            step_delay: Duration::from_micros(DEFAULT_STEP_DELAY_US),
            spinup_delay: Duration::from_micros(DEFAULT_SPINUP_DELAY_US),
        }
    }
}

/// Per-motor mutable state.
#[derive(Debug)]
struct MotorState {
    /// Position in the half-step sequence, always in `0..SEQ_LEN`.
    cursor: usize,
    /// Output shaft angle in degrees, always in `[0, 360)`.
    angle_deg: f64,
}

struct StepperInner {
    name: String,
    field: MotorField,
    bus: Arc<RegisterBus>,
    profile: MotorProfile,
    state: Mutex<MotorState>,
    busy: AtomicBool,
    shutdown: Arc<AtomicBool>,
}

/// Controller for one stepper motor on a shared register.
///
/// Cursor and angle are guarded per motor, so concurrent access is never
/// torn at the memory level; semantically, commands for one motor are
/// expected to be serialized by the caller (a second rotation on a busy
/// motor is rejected rather than raced).
#[derive(Clone)]
pub struct Stepper {
    inner: Arc<StepperInner>,
}

impl Stepper {
    /// Construct a controller. Prefer [`StepperBank::add_motor`], which
    /// draws the field from the bank's allocator and threads the shared
    /// shutdown flag through.
    ///
    /// [`StepperBank::add_motor`]: crate::supervisor::StepperBank::add_motor
    pub(crate) fn new(
        name: String,
        field: MotorField,
        bus: Arc<RegisterBus>,
        profile: MotorProfile,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(StepperInner {
                name,
                field,
                bus,
                profile,
                state: Mutex::new(MotorState {
                    cursor: 0,
                    angle_deg: 0.0,
                }),
                busy: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Motor name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// This motor's slice of the shared register.
    pub fn field(&self) -> MotorField {
        self.inner.field
    }

    /// Mechanical and timing parameters.
    pub fn profile(&self) -> &MotorProfile {
        &self.inner.profile
    }

    /// Current output shaft angle in degrees, in `[0, 360)`.
    pub fn angle(&self) -> f64 {
        self.lock_state().angle_deg
    }

    /// Current position in the half-step sequence.
    pub fn step_index(&self) -> usize {
        self.lock_state().cursor
    }

    /// Whether a rotation is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Redefine the current shaft position as 0°.
    ///
    /// No hardware side effects. Calling this while a rotation is in
    /// flight interleaves with its angle updates; serialize per motor.
    pub fn zero(&self) {
        self.lock_state().angle_deg = 0.0;
    }

    /// Take one step and block for the inter-step delay.
    ///
    /// Advances the cursor by one, commits the new excitation pattern into
    /// this motor's field together with the hardware write, and updates
    /// the angle: one critical section per step. The delay is slept with
    /// no lock held.
    ///
    /// # Errors
    /// Propagates a failed sink transmission; cursor and angle are not
    /// advanced in that case, so they stay in sync with the rotor.
    pub fn step(&self, direction: Direction) -> Result<(), MotionError> {
        self.step_once(direction)?;
        thread::sleep(self.inner.profile.step_delay);
        Ok(())
    }

    /// Rotate by a relative angle, fire-and-forget.
    ///
    /// Rounds `delta_deg` to a whole step count and runs the step loop on
    /// a dedicated thread after the spin-up delay, returning immediately
    /// with a joinable handle. A delta that rounds to zero steps completes
    /// inline: no lock is taken and nothing is written to the sink.
    ///
    /// # Errors
    /// Returns `MotionError::MotorBusy` if a rotation is already in
    /// flight. Transmission failures abort the spawned loop and surface on
    /// [`RotationHandle::join`].
    pub fn rotate(&self, delta_deg: f64) -> Result<RotationHandle, MotionError> {
        let steps = (delta_deg.abs() * self.inner.profile.steps_per_degree()).round() as u32;
        let Some(direction) = Direction::from_delta(delta_deg) else {
            return Ok(RotationHandle::completed(RotationReport::empty()));
        };
        if steps == 0 {
            return Ok(RotationHandle::completed(RotationReport::empty()));
        }

        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MotionError::MotorBusy {
                motor: self.inner.name.clone(),
            });
        }

        debug!(motor = %self.inner.name, delta_deg, steps, ?direction, "rotation start");
        let this = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("rotate-{}", self.inner.name))
            .spawn(move || this.run_rotation(direction, steps));
        match spawned {
            Ok(join) => Ok(RotationHandle::spawned(self.inner.name.clone(), join)),
            Err(e) => {
                self.inner.busy.store(false, Ordering::Release);
                Err(MotionError::SpawnFailed {
                    motor: self.inner.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Rotate to an absolute angle along the shortest arc.
    ///
    /// The delta always lands in `(-180°, +180°]`: a move from 10° to 200°
    /// turns −170°, not +190°.
    ///
    /// # Errors
    /// Same as [`rotate`](Stepper::rotate).
    pub fn go_angle(&self, target_deg: f64) -> Result<RotationHandle, MotionError> {
        let current = self.angle();
        let delta = shortest_arc(target_deg - current);
        debug!(motor = %self.inner.name, target_deg, current, delta, "go_angle");
        self.rotate(delta)
    }

    /// One step's critical section: cursor advance, register commit with
    /// hardware write, angle update.
    fn step_once(&self, direction: Direction) -> Result<(), MotionError> {
        let mut state = self.lock_state();
        let next = (state.cursor as i32 + direction.delta()).rem_euclid(SEQ_LEN as i32) as usize;
        self.inner.bus.commit(self.inner.field, HALF_STEP_CCW[next])?;
        state.cursor = next;
        state.angle_deg = (state.angle_deg
            + f64::from(direction.delta()) / self.inner.profile.steps_per_degree())
        .rem_euclid(360.0);
        trace!(motor = %self.inner.name, cursor = next, angle = state.angle_deg, "step");
        Ok(())
    }

    fn run_rotation(
        &self,
        direction: Direction,
        steps: u32,
    ) -> Result<RotationReport, MotionError> {
        let _busy = BusyReset(&self.inner.busy);
        thread::sleep(self.inner.profile.spinup_delay);

        let mut taken = 0u32;
        while taken < steps {
            if self.inner.shutdown.load(Ordering::Acquire) {
                debug!(motor = %self.inner.name, taken, steps, "rotation cancelled");
                return Ok(RotationReport {
                    steps_requested: steps,
                    steps_taken: taken,
                    cancelled: true,
                });
            }
            if let Err(e) = self.step(direction) {
                error!(motor = %self.inner.name, taken, steps, error = %e, "rotation aborted");
                return Err(e);
            }
            taken += 1;
        }

        debug!(motor = %self.inner.name, steps, "rotation complete");
        Ok(RotationReport {
            steps_requested: steps,
            steps_taken: taken,
            cancelled: false,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, MotorState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the busy flag when the rotation thread exits, on any path.
struct BusyReset<'a>(&'a AtomicBool);

impl Drop for BusyReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Map a signed angular delta onto the shortest equivalent arc in
/// `(-180°, +180°]`.
pub fn shortest_arc(delta_deg: f64) -> f64 {
    let wrapped = delta_deg.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}
