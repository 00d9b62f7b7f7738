//! First-person locomotion: damped velocity integration, gravity, jumping and
//! clamping of the viewer into the room.
//!
//! The controller owns the viewer [`Pose`] and [`MotionState`]. Input arrives
//! through explicit setters (`set_move_forward`, `request_jump`, look deltas,
//! joystick) and is consumed by [`LocomotionController::update`] once per
//! rendered frame. Nothing moves while the controller is [`LockState::Unlocked`].

use glam::{EulerRot, Quat, Vec2, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, LocomotionConfig, RoomBounds};
use crate::math::normalize_or_zero;

/// Position and orientation of the viewer. Roll is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    /// Rotation about world up, in radians. Zero looks down `-Z`.
    pub yaw: f32,
    /// Rotation about the camera's right axis, in radians. Positive looks up.
    pub pitch: f32,
}

impl Pose {
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self {
            position,
            yaw,
            pitch: 0.0,
        }
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// Full view direction including pitch.
    pub fn look_direction(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }

    /// View direction projected onto the floor plane.
    pub fn horizontal_forward(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, -self.yaw.cos())
    }

    pub fn right(&self) -> Vec3 {
        Vec3::new(self.yaw.cos(), 0.0, -self.yaw.sin())
    }
}

/// Held movement flags, one per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFlags {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl MoveFlags {
    pub fn any(&self) -> bool {
        self.forward || self.backward || self.left || self.right
    }

    /// Unit direction in camera space (`x` right, `z` forward), or zero.
    pub fn direction(&self) -> Vec3 {
        let z = f32::from(u8::from(self.forward)) - f32::from(u8::from(self.backward));
        let x = f32::from(u8::from(self.right)) - f32::from(u8::from(self.left));
        normalize_or_zero(Vec3::new(x, 0.0, z))
    }
}

/// Velocity and input state integrated by the controller.
///
/// Horizontal velocity is expressed in the camera frame with negated axes:
/// `x` is negated right, `z` is negated forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionState {
    pub velocity: Vec3,
    pub grounded: bool,
    pub input: MoveFlags,
    pub jump_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockState {
    #[default]
    Unlocked,
    Locked,
}

/// Converts directional input into pose changes inside a [`RoomBounds`].
#[derive(Debug, Clone)]
pub struct LocomotionController {
    config: LocomotionConfig,
    room: RoomBounds,
    pose: Pose,
    motion: MotionState,
    lock: LockState,
    joystick: Vec2,
}

impl LocomotionController {
    /// Fails when the room leaves no walkable space or a tunable is invalid;
    /// the start pose itself is clamped into the room.
    pub fn new(config: LocomotionConfig, room: RoomBounds, start: Pose) -> Result<Self, ConfigError> {
        config.validate()?;
        room.validate(config.ceiling_epsilon)?;
        let mut controller = Self {
            config,
            room,
            pose: start,
            motion: MotionState::default(),
            lock: LockState::Unlocked,
            joystick: Vec2::ZERO,
        };
        controller.clamp_position();
        controller.clamp_pitch();
        controller.motion.grounded = controller.pose.position.y <= room.eye_height;
        Ok(controller)
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    pub fn config(&self) -> &LocomotionConfig {
        &self.config
    }

    pub fn room(&self) -> &RoomBounds {
        &self.room
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    pub fn is_locked(&self) -> bool {
        self.lock == LockState::Locked
    }

    pub fn lock(&mut self) {
        if self.lock != LockState::Locked {
            debug!("navigation locked");
            self.lock = LockState::Locked;
        }
    }

    /// Leaves navigation mode. Held input is dropped so that keys released
    /// while unlocked cannot keep the viewer walking after the next lock.
    pub fn unlock(&mut self) {
        if self.lock != LockState::Unlocked {
            debug!("navigation unlocked");
            self.lock = LockState::Unlocked;
        }
        self.motion.input = MoveFlags::default();
        self.motion.jump_requested = false;
        self.joystick = Vec2::ZERO;
    }

    /// Platform focus loss behaves like an explicit unlock.
    pub fn focus_lost(&mut self) {
        self.unlock();
    }

    pub fn set_move_forward(&mut self, active: bool) {
        self.motion.input.forward = active;
    }

    pub fn set_move_backward(&mut self, active: bool) {
        self.motion.input.backward = active;
    }

    pub fn set_move_left(&mut self, active: bool) {
        self.motion.input.left = active;
    }

    pub fn set_move_right(&mut self, active: bool) {
        self.motion.input.right = active;
    }

    pub fn set_move_flags(&mut self, flags: MoveFlags) {
        self.motion.input = flags;
    }

    /// Requests a jump on the next update. Dropped unless locked and grounded.
    pub fn request_jump(&mut self) {
        if self.is_locked() && self.motion.grounded {
            self.motion.jump_requested = true;
        }
    }

    /// Applies a locked-pointer movement delta in pixels.
    pub fn apply_pointer_delta(&mut self, delta: Vec2) {
        self.apply_look(delta, self.config.pointer_sensitivity);
    }

    /// Applies a touch-drag delta in pixels.
    pub fn apply_touch_delta(&mut self, delta: Vec2) {
        self.apply_look(delta, self.config.touch_sensitivity);
    }

    fn apply_look(&mut self, delta: Vec2, sensitivity: f32) {
        if !self.is_locked() {
            return;
        }
        self.pose.yaw -= delta.x * sensitivity;
        self.pose.pitch -= delta.y * sensitivity;
        self.clamp_pitch();
    }

    /// Sets the virtual stick displacement from its centre. `x` points right,
    /// `y` points down the screen; the vector is limited to the unit disc.
    pub fn set_joystick(&mut self, displacement: Vec2) {
        self.joystick = displacement.clamp_length_max(1.0);
    }

    pub fn release_joystick(&mut self) {
        self.joystick = Vec2::ZERO;
    }

    pub fn joystick(&self) -> Vec2 {
        self.joystick
    }

    /// Places the viewer, keeping the result inside the room.
    pub fn set_position(&mut self, position: Vec3) {
        self.pose.position = position;
        self.clamp_position();
        self.motion.grounded = self.pose.position.y <= self.room.eye_height;
    }

    /// Advances the simulation by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.clamp_pitch();
        if !self.is_locked() || dt <= 0.0 {
            return;
        }
        let LocomotionConfig {
            damping,
            gravity,
            speed,
            jump_velocity,
            ..
        } = self.config;
        let motion = &mut self.motion;

        motion.velocity.x -= motion.velocity.x * damping * dt;
        motion.velocity.z -= motion.velocity.z * damping * dt;

        if !(motion.grounded && !motion.jump_requested) {
            motion.velocity.y -= gravity * dt;
        }

        let direction = motion.input.direction();
        if motion.input.forward || motion.input.backward {
            motion.velocity.z -= direction.z * speed * dt;
        }
        if motion.input.left || motion.input.right {
            motion.velocity.x -= direction.x * speed * dt;
        }

        if motion.jump_requested {
            if motion.grounded {
                motion.velocity.y = jump_velocity;
                motion.grounded = false;
            }
            motion.jump_requested = false;
        }

        let right = self.pose.right();
        let forward = self.pose.horizontal_forward();
        let mut step = right * (-motion.velocity.x * dt) + forward * (-motion.velocity.z * dt);
        step.y = motion.velocity.y * dt;
        if self.joystick != Vec2::ZERO {
            step += (forward * -self.joystick.y + right * self.joystick.x)
                * self.config.joystick_speed
                * dt;
        }
        self.pose.position += step;

        self.resolve_collisions();
    }

    fn resolve_collisions(&mut self) {
        let min = self.room.min_corner();
        let max = self.room.max_corner(self.config.ceiling_epsilon);
        let right = self.pose.right();
        let forward = self.pose.horizontal_forward();
        let position = &mut self.pose.position;

        let mut blocked = Vec3::ONE;
        if position.x < min.x || position.x > max.x {
            position.x = position.x.clamp(min.x, max.x);
            blocked.x = 0.0;
        }
        if position.z < min.z || position.z > max.z {
            position.z = position.z.clamp(min.z, max.z);
            blocked.z = 0.0;
        }
        if blocked.x == 0.0 || blocked.z == 0.0 {
            // Velocity lives in the camera frame; remove only the world-axis
            // component that drove into the wall.
            let world = right * self.motion.velocity.x + forward * self.motion.velocity.z;
            let world = world * blocked;
            self.motion.velocity.x = world.dot(right);
            self.motion.velocity.z = world.dot(forward);
        }

        if position.y < min.y {
            position.y = min.y;
            self.motion.velocity.y = 0.0;
            self.motion.grounded = true;
        }
        if position.y > max.y {
            position.y = max.y;
            self.motion.velocity.y = 0.0;
        }
    }

    fn clamp_position(&mut self) {
        let min = self.room.min_corner();
        let max = self.room.max_corner(self.config.ceiling_epsilon);
        self.pose.position = self.pose.position.clamp(min, max);
    }

    fn clamp_pitch(&mut self) {
        let limit = self.config.max_pitch;
        self.pose.pitch = self.pose.pitch.clamp(-limit, limit);
    }
}
