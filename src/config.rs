use std::f32::consts::PI;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected configuration values, reported once when a gallery is loaded.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("room {axis} must be positive, got {value}")]
    NonPositiveDimension { axis: &'static str, value: f32 },
    #[error("wall margin {margin} leaves no walkable floor in a {width}x{length} room")]
    MarginTooLarge { margin: f32, width: f32, length: f32 },
    #[error("eye height {eye_height} does not fit under a ceiling at {ceiling}")]
    EyeAboveCeiling { eye_height: f32, ceiling: f32 },
    #[error("{name} must be a finite non-negative number, got {value}")]
    InvalidTunable { name: &'static str, value: f32 },
}

/// Axis-aligned room centred on the origin with the floor at `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomBounds {
    pub width: f32,
    pub length: f32,
    pub height: f32,
    #[serde(default = "default_wall_margin")]
    pub wall_margin: f32,
    #[serde(default = "default_eye_height")]
    pub eye_height: f32,
}

impl Default for RoomBounds {
    fn default() -> Self {
        Self {
            width: 20.0,
            length: 20.0,
            height: 12.0,
            wall_margin: default_wall_margin(),
            eye_height: default_eye_height(),
        }
    }
}

impl RoomBounds {
    pub fn validate(&self, ceiling_epsilon: f32) -> Result<(), ConfigError> {
        for (axis, value) in [
            ("width", self.width),
            ("length", self.length),
            ("height", self.height),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveDimension { axis, value });
            }
        }
        check_tunable("wall margin", self.wall_margin)?;
        check_tunable("eye height", self.eye_height)?;
        if self.wall_margin * 2.0 >= self.width.min(self.length) {
            return Err(ConfigError::MarginTooLarge {
                margin: self.wall_margin,
                width: self.width,
                length: self.length,
            });
        }
        let ceiling = self.height - ceiling_epsilon;
        if self.eye_height > ceiling {
            return Err(ConfigError::EyeAboveCeiling {
                eye_height: self.eye_height,
                ceiling,
            });
        }
        Ok(())
    }

    /// Smallest walkable corner (x, floor eye level, z).
    pub fn min_corner(&self) -> Vec3 {
        Vec3::new(
            -self.width / 2.0 + self.wall_margin,
            self.eye_height,
            -self.length / 2.0 + self.wall_margin,
        )
    }

    /// Largest walkable corner for a ceiling clearance of `ceiling_epsilon`.
    pub fn max_corner(&self, ceiling_epsilon: f32) -> Vec3 {
        Vec3::new(
            self.width / 2.0 - self.wall_margin,
            self.height - ceiling_epsilon,
            self.length / 2.0 - self.wall_margin,
        )
    }
}

fn default_wall_margin() -> f32 {
    0.5
}

fn default_eye_height() -> f32 {
    1.6
}

/// Movement tunables. Units are metres and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionConfig {
    /// Exponential decay rate of horizontal velocity, per second.
    pub damping: f32,
    pub gravity: f32,
    /// Horizontal acceleration applied while a direction is held.
    pub speed: f32,
    pub jump_velocity: f32,
    /// Pitch is kept within `[-max_pitch, max_pitch]` radians.
    pub max_pitch: f32,
    /// Radians per pixel of locked pointer movement.
    pub pointer_sensitivity: f32,
    /// Radians per pixel of touch drag.
    pub touch_sensitivity: f32,
    /// Translation speed at full joystick deflection.
    pub joystick_speed: f32,
    /// Clearance kept between the eye and the ceiling.
    pub ceiling_epsilon: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            damping: 10.0,
            gravity: 30.0,
            speed: 20.0,
            jump_velocity: 6.0,
            max_pitch: PI / 2.8,
            pointer_sensitivity: 0.002,
            touch_sensitivity: 0.005,
            joystick_speed: 3.0,
            ceiling_epsilon: 0.1,
        }
    }
}

impl LocomotionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_tunable("damping", self.damping)?;
        check_tunable("gravity", self.gravity)?;
        check_tunable("speed", self.speed)?;
        check_tunable("jump velocity", self.jump_velocity)?;
        check_tunable("max pitch", self.max_pitch)?;
        check_tunable("pointer sensitivity", self.pointer_sensitivity)?;
        check_tunable("touch sensitivity", self.touch_sensitivity)?;
        check_tunable("joystick speed", self.joystick_speed)?;
        check_tunable("ceiling epsilon", self.ceiling_epsilon)
    }
}

/// Exhibit interaction tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Distance under which the nearest exhibit's info is shown without a click.
    pub proximity_threshold: f32,
    /// Emissive colour added to a selected exhibit's appearance.
    pub highlight_emissive: Vec3,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: 5.0,
            highlight_emissive: Vec3::splat(f32::from(0x22u8) / 255.0),
        }
    }
}

/// Perspective camera used for rendering and pointer picking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Everything a [`crate::GallerySession`] needs besides the exhibits.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GalleryConfig {
    pub room: RoomBounds,
    #[serde(default)]
    pub locomotion: LocomotionConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

impl GalleryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.locomotion.validate()?;
        self.room.validate(self.locomotion.ceiling_epsilon)?;
        check_tunable("proximity threshold", self.interaction.proximity_threshold)
    }
}

fn check_tunable(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTunable { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(GalleryConfig::default().validate(), Ok(()));
    }

    #[test]
    fn walkable_corners_respect_margin() {
        let room = RoomBounds::default();
        assert_eq!(room.min_corner(), Vec3::new(-9.5, 1.6, -9.5));
        assert_eq!(room.max_corner(0.1), Vec3::new(9.5, 11.9, 9.5));
    }

    #[test]
    fn oversized_margin_is_rejected() {
        let room = RoomBounds {
            width: 1.0,
            wall_margin: 0.5,
            ..RoomBounds::default()
        };
        assert!(matches!(
            room.validate(0.1),
            Err(ConfigError::MarginTooLarge { .. })
        ));
    }

    #[test]
    fn eye_above_ceiling_is_rejected() {
        let room = RoomBounds {
            height: 1.0,
            ..RoomBounds::default()
        };
        assert!(matches!(
            room.validate(0.1),
            Err(ConfigError::EyeAboveCeiling { .. })
        ));
    }

    #[test]
    fn negative_tunable_is_rejected() {
        let config = LocomotionConfig {
            gravity: -1.0,
            ..LocomotionConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTunable {
                name: "gravity",
                value: -1.0
            })
        );
    }
}
