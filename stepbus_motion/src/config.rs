//! Motion configuration: register chain, motor profiles, move script.
//!
//! # TOML layout
//!
//! ```toml
//! [shared]
//! log_level = "info"
//! service_name = "stepbus-demo"
//!
//! [register]
//! width_bits = 8
//! driver = "simulation"
//!
//! [motor_defaults]
//! steps_per_rev = 4096
//! step_delay_us = 1200
//! spinup_delay_us = 100000
//!
//! [[motors]]
//! name = "m1"
//!
//! [[motors]]
//! name = "m2"
//! step_delay_us = 900
//!
//! [[moves]]
//! motor = "m1"
//! go_angle = 90.0
//!
//! [[moves]]
//! motor = "m2"
//! rotate = -90.0
//! ```
//!
//! Motors are listed in physical wiring order: the first entry drives the
//! field at bit 0 of the chain.

use crate::stepper::MotorProfile;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use stepbus_common::config::{ConfigError, SharedConfig};
use stepbus_common::consts::{
    DEFAULT_REGISTER_BITS, DEFAULT_SPINUP_DELAY_US, DEFAULT_STEP_DELAY_US, DEFAULT_STEPS_PER_REV,
    FIELD_BITS, MAX_REGISTER_BITS,
};

/// Top-level configuration for the stepbus binary.
#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    /// Shared service fields (log level, service name).
    pub shared: SharedConfig,

    /// Register chain parameters.
    #[serde(default)]
    pub register: RegisterConfig,

    /// Fallback timing/mechanical parameters for all motors.
    #[serde(default)]
    pub motor_defaults: ProfileConfig,

    /// Motors in physical wiring order.
    pub motors: Vec<MotorConfig>,

    /// Declarative move script executed by the binary.
    #[serde(default)]
    pub moves: Vec<MoveConfig>,
}

/// Register chain parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterConfig {
    /// Chain width in bits.
    #[serde(default = "default_width_bits")]
    pub width_bits: u32,

    /// Sink driver name, resolved through the registry.
    #[serde(default = "default_driver")]
    pub driver: String,
}

fn default_width_bits() -> u32 {
    DEFAULT_REGISTER_BITS
}

fn default_driver() -> String {
    "simulation".to_string()
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            width_bits: default_width_bits(),
            driver: default_driver(),
        }
    }
}

/// Default timing/mechanical parameters, in TOML-friendly units.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Steps per full output-shaft revolution.
    #[serde(default = "default_steps_per_rev")]
    pub steps_per_rev: u32,

    /// Delay between consecutive steps, in microseconds.
    #[serde(default = "default_step_delay_us")]
    pub step_delay_us: u64,

    /// Delay before a rotation's step loop begins, in microseconds.
    #[serde(default = "default_spinup_delay_us")]
    pub spinup_delay_us: u64,
}

fn default_steps_per_rev() -> u32 {
    DEFAULT_STEPS_PER_REV
}

fn default_step_delay_us() -> u64 {
    DEFAULT_STEP_DELAY_US
}

fn default_spinup_delay_us() -> u64 {
    DEFAULT_SPINUP_DELAY_US
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            steps_per_rev: default_steps_per_rev(),
            step_delay_us: default_step_delay_us(),
            spinup_delay_us: default_spinup_delay_us(),
        }
    }
}

impl ProfileConfig {
    /// Resolve a motor's runtime profile from these defaults plus the
    /// motor's own overrides.
    pub fn resolve(&self, motor: &MotorConfig) -> MotorProfile {
        MotorProfile {
            steps_per_rev: motor.steps_per_rev.unwrap_or(self.steps_per_rev),
            step_delay: Duration::from_micros(motor.step_delay_us.unwrap_or(self.step_delay_us)),
            spinup_delay: Duration::from_micros(
                motor.spinup_delay_us.unwrap_or(self.spinup_delay_us),
            ),
        }
    }
}

/// One motor entry, with optional overrides of the default profile.
#[derive(Debug, Clone, Deserialize)]
pub struct MotorConfig {
    /// Motor name, unique within the config.
    pub name: String,

    /// Steps-per-revolution override.
    pub steps_per_rev: Option<u32>,

    /// Inter-step delay override, in microseconds.
    pub step_delay_us: Option<u64>,

    /// Spin-up delay override, in microseconds.
    pub spinup_delay_us: Option<u64>,
}

/// One scripted move: absolute (`go_angle`) or relative (`rotate`), never
/// both.
#[derive(Debug, Clone, Deserialize)]
pub struct MoveConfig {
    /// Target motor name.
    pub motor: String,

    /// Absolute target angle in degrees.
    pub go_angle: Option<f64>,

    /// Relative delta in degrees.
    pub rotate: Option<f64>,
}

impl MotionConfig {
    /// Validate cross-field constraints.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for an empty motor list,
    /// duplicate or empty motor names, a width the motors cannot fit, zero
    /// steps-per-rev, moves naming unknown motors, or moves that specify
    /// both (or neither) of `go_angle`/`rotate`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let width = self.register.width_bits;
        if width == 0 || width % FIELD_BITS != 0 || width > MAX_REGISTER_BITS {
            return Err(ConfigError::ValidationError(format!(
                "register.width_bits must be a multiple of {FIELD_BITS} in {FIELD_BITS}..={MAX_REGISTER_BITS}, got {width}"
            )));
        }

        if self.motors.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [[motors]] entry is required".to_string(),
            ));
        }
        let capacity = width / FIELD_BITS;
        if self.motors.len() as u32 > capacity {
            return Err(ConfigError::ValidationError(format!(
                "{} motors exceed the {width}-bit register ({capacity} fields)",
                self.motors.len()
            )));
        }

        let mut names = HashSet::new();
        for motor in &self.motors {
            if motor.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "motor name cannot be empty".to_string(),
                ));
            }
            if !names.insert(motor.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate motor name: {}",
                    motor.name
                )));
            }
            let steps_per_rev = motor.steps_per_rev.unwrap_or(self.motor_defaults.steps_per_rev);
            if steps_per_rev == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "motor '{}' has zero steps_per_rev",
                    motor.name
                )));
            }
        }

        for (idx, mv) in self.moves.iter().enumerate() {
            if !names.contains(mv.motor.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "move #{idx} targets unknown motor '{}'",
                    mv.motor
                )));
            }
            match (mv.go_angle, mv.rotate) {
                (Some(_), Some(_)) => {
                    return Err(ConfigError::ValidationError(format!(
                        "move #{idx} sets both go_angle and rotate"
                    )));
                }
                (None, None) => {
                    return Err(ConfigError::ValidationError(format!(
                        "move #{idx} sets neither go_angle nor rotate"
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use stepbus_common::config::ConfigLoader;
    use tempfile::NamedTempFile;

    const GOOD_CONFIG: &str = r#"
[shared]
log_level = "debug"
service_name = "stepbus-test"

[register]
width_bits = 8
driver = "simulation"

[[motors]]
name = "m1"

[[motors]]
name = "m2"
step_delay_us = 900

[[moves]]
motor = "m1"
go_angle = 90.0

[[moves]]
motor = "m2"
rotate = -90.0
"#;

    fn parse(text: &str) -> MotionConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn good_config_parses_and_validates() {
        let config = parse(GOOD_CONFIG);
        config.validate().unwrap();

        assert_eq!(config.register.width_bits, 8);
        assert_eq!(config.motors.len(), 2);
        assert_eq!(config.moves.len(), 2);
    }

    #[test]
    fn loads_from_file_through_config_loader() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{GOOD_CONFIG}").unwrap();
        file.flush().unwrap();

        let config = MotionConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.service_name, "stepbus-test");
    }

    #[test]
    fn profile_overrides_fall_back_to_defaults() {
        let config = parse(GOOD_CONFIG);

        let m1 = config.motor_defaults.resolve(&config.motors[0]);
        assert_eq!(m1.steps_per_rev, DEFAULT_STEPS_PER_REV);
        assert_eq!(m1.step_delay, Duration::from_micros(DEFAULT_STEP_DELAY_US));

        let m2 = config.motor_defaults.resolve(&config.motors[1]);
        assert_eq!(m2.step_delay, Duration::from_micros(900));
    }

    #[test]
    fn rejects_more_motors_than_the_register_fits() {
        let mut config = parse(GOOD_CONFIG);
        config.motors.push(MotorConfig {
            name: "m3".to_string(),
            steps_per_rev: None,
            step_delay_us: None,
            spinup_delay_us: None,
        });

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_duplicate_motor_names() {
        let mut config = parse(GOOD_CONFIG);
        config.motors[1].name = "m1".to_string();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_odd_register_width() {
        let mut config = parse(GOOD_CONFIG);
        config.register.width_bits = 10;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_move_on_unknown_motor() {
        let mut config = parse(GOOD_CONFIG);
        config.moves[0].motor = "m9".to_string();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_move_with_both_or_neither_target() {
        let mut config = parse(GOOD_CONFIG);
        config.moves[0].rotate = Some(10.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = parse(GOOD_CONFIG);
        config.moves[1].rotate = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn register_section_defaults_when_omitted() {
        let config = parse(
            r#"
[shared]
service_name = "stepbus-test"

[[motors]]
name = "m1"
"#,
        );
        config.validate().unwrap();

        assert_eq!(config.register.width_bits, DEFAULT_REGISTER_BITS);
        assert_eq!(config.register.driver, "simulation");
        assert!(config.moves.is_empty());
    }
}
