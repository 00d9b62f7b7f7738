//! Core of a first-person virtual gallery.
//!
//! The crate owns the viewer's locomotion (damped movement, gravity, jumping
//! and clamping into the room) and the exhibit interaction rules (click
//! selection with highlight, proximity info). Rendering and the info panel
//! are reached through small traits so the same logic runs in a native
//! window, in the browser, or headless from a walk script.

pub mod assets;
pub mod config;
pub mod input;
pub mod interaction;
pub mod locomotion;
pub mod math;
pub mod render;
pub mod replay;
pub mod scene;
pub mod session;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::{CameraConfig, ConfigError, GalleryConfig, InteractionConfig, LocomotionConfig, RoomBounds};
pub use input::{FrameInput, InputState, KeyCode, MouseButton, NamedKey, TouchRelease, TouchTrack};
pub use interaction::{
    Appearance, Exhibit, ExhibitHandle, ExhibitId, ExhibitInfo, InfoPanel, InteractionError,
    InteractionManager, SceneBackend,
};
pub use locomotion::{LocomotionController, LockState, MotionState, Pose};
#[cfg(not(target_arch = "wasm32"))]
pub use render::Renderer;
pub use render::{CameraParams, LightParams};
pub use scene::{ExhibitPlacement, Light, LightKind, Scene};
pub use session::GallerySession;
