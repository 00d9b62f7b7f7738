use glam::{Mat4, Vec2};
use log::debug;

use crate::config::{CameraConfig, ConfigError};
use crate::input::{FrameInput, LockRequest};
use crate::interaction::{ExhibitHandle, InfoPanel, InteractionManager, SceneBackend};
use crate::locomotion::{LocomotionController, Pose};
use crate::math::Ray;
use crate::render::{CameraParams, LightParams};
use crate::scene::Scene;

/// Longest simulated step per tick, in seconds. Longer frames (a tab coming
/// back from the background) are truncated.
pub const MAX_TICK: f32 = 0.1;

/// What one [`GallerySession::tick`] did besides moving the viewer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Result of each click, in order: the exhibit hit, or `None` on a miss.
    pub clicks: Vec<Option<ExhibitHandle>>,
    /// Exhibit shown by the proximity scan.
    pub nearby: Option<ExhibitHandle>,
}

/// A walkable gallery: the loaded scene, the viewer's controller and the
/// exhibit registry, advanced together once per frame.
#[derive(Debug, Clone)]
pub struct GallerySession {
    scene: Scene,
    controller: LocomotionController,
    exhibits: InteractionManager,
    aspect: f32,
}

impl GallerySession {
    /// Creates a session with an empty exhibit registry; see
    /// [`crate::assets::assemble`] to populate it.
    pub fn new(scene: Scene) -> Result<Self, ConfigError> {
        let config = scene.config;
        let controller =
            LocomotionController::new(config.locomotion, config.room, scene.start.pose())?;
        Ok(Self {
            exhibits: InteractionManager::new(config.interaction),
            controller,
            scene,
            aspect: 16.0 / 9.0,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn controller(&self) -> &LocomotionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut LocomotionController {
        &mut self.controller
    }

    pub fn exhibits(&self) -> &InteractionManager {
        &self.exhibits
    }

    pub fn exhibits_mut(&mut self) -> &mut InteractionManager {
        &mut self.exhibits
    }

    pub fn pose(&self) -> &Pose {
        self.controller.pose()
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn camera(&self) -> CameraParams {
        camera_params(self.pose(), &self.scene.config.camera, self.aspect)
    }

    pub fn light(&self) -> LightParams {
        LightParams::from_scene(&self.scene)
    }

    /// Pick ray through a point in normalised device coordinates.
    pub fn click_ray(&self, ndc: Vec2) -> Ray {
        Ray::from_ndc(ndc, self.camera().view_proj.inverse())
    }

    /// Advances the gallery by one frame: lock changes, held input and look
    /// deltas, locomotion, click picking, then the proximity scan.
    pub fn tick(
        &mut self,
        dt: f32,
        input: &FrameInput,
        scene: &mut dyn SceneBackend,
        panel: &mut dyn InfoPanel,
    ) -> TickReport {
        for request in &input.lock_requests {
            match request {
                LockRequest::Lock => self.controller.lock(),
                LockRequest::Unlock => self.controller.unlock(),
                LockRequest::FocusLost => self.controller.focus_lost(),
            }
        }

        let controller = &mut self.controller;
        controller.set_move_flags(input.movement);
        controller.apply_pointer_delta(input.pointer_delta);
        controller.apply_touch_delta(input.touch_delta);
        match input.joystick {
            Some(displacement) => controller.set_joystick(displacement),
            None => controller.release_joystick(),
        }
        if input.jump {
            controller.request_jump();
        }

        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_TICK) } else { 0.0 };
        controller.update(dt);

        let mut report = TickReport::default();
        for &ndc in &input.clicks {
            let ray = self.click_ray(ndc);
            let hit = self.exhibits.handle_click(&ray, scene, panel);
            debug!("click at ({:.2}, {:.2}) -> {hit:?}", ndc.x, ndc.y);
            report.clicks.push(hit);
        }

        report.nearby = self
            .exhibits
            .scan_proximity(self.controller.pose().position, panel);
        report
    }
}

/// Right-handed view from the pose and a GL-style perspective projection.
pub fn camera_params(pose: &Pose, camera: &CameraConfig, aspect: f32) -> CameraParams {
    let view = Mat4::from_rotation_translation(pose.rotation(), pose.position).inverse();
    let projection = Mat4::perspective_rh_gl(
        camera.fov.to_radians(),
        aspect.max(0.01),
        camera.near,
        camera.far,
    );
    CameraParams {
        view_proj: projection * view,
        position: pose.position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::tests::{RecordingPanel, RecordingScene};
    use crate::interaction::ExhibitProxy;
    use crate::locomotion::MoveFlags;
    use glam::Vec3;

    const GALLERY: &str = r#"
    <gallery>
        <start><position>0 1.6 0</position></start>
        <exhibit><id>north</id><title>North</title><position>0 1.6 -9.9</position><size>4 3</size></exhibit>
        <exhibit><id>east</id><title>East</title><position>9.9 1.6 0</position><rotation>0 -90 0</rotation></exhibit>
    </gallery>
    "#;

    fn session() -> GallerySession {
        let mut session = GallerySession::new(Scene::from_xml(GALLERY).unwrap()).unwrap();
        let scene = session.scene().clone();
        for placement in &scene.exhibits {
            let handle = session.exhibits_mut().register(placement.to_exhibit()).unwrap();
            session
                .exhibits_mut()
                .resolve_proxy(handle, ExhibitProxy { size: placement.size })
                .unwrap();
        }
        session
    }

    fn frame() -> FrameInput {
        FrameInput::default()
    }

    #[test]
    fn centre_click_picks_exhibit_in_view() {
        let mut session = session();
        let mut backend = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        let input = FrameInput {
            clicks: vec![Vec2::ZERO],
            ..frame()
        };
        let report = session.tick(1.0 / 60.0, &input, &mut backend, &mut panel);
        let north = session.exhibits().find("north");
        assert_eq!(report.clicks, vec![north]);
        assert_eq!(session.exhibits().selected(), north);
        assert_eq!(panel.shown, vec!["North".to_string()]);
    }

    #[test]
    fn click_ray_starts_at_the_eye_and_looks_forward() {
        let session = session();
        let ray = session.click_ray(Vec2::ZERO);
        assert!(ray.direction.abs_diff_eq(Vec3::NEG_Z, 1e-3));
        assert!((ray.origin - session.pose().position).length() < 0.2);
    }

    #[test]
    fn click_into_empty_space_clears_selection() {
        let mut session = session();
        let mut backend = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        let north = session.exhibits().find("north").unwrap();
        session
            .exhibits_mut()
            .select(north, &mut backend, &mut panel)
            .unwrap();

        // Straight up at the ceiling.
        let input = FrameInput {
            clicks: vec![Vec2::new(0.0, 0.99)],
            ..frame()
        };
        session.controller_mut().lock();
        session.controller_mut().apply_pointer_delta(Vec2::new(0.0, -1000.0));
        let report = session.tick(1.0 / 60.0, &input, &mut backend, &mut panel);
        assert_eq!(report.clicks, vec![None]);
        assert_eq!(session.exhibits().selected(), None);
    }

    #[test]
    fn unlocked_session_ignores_movement() {
        let mut session = session();
        let mut backend = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        let input = FrameInput {
            movement: MoveFlags {
                forward: true,
                ..MoveFlags::default()
            },
            ..frame()
        };
        for _ in 0..30 {
            session.tick(1.0 / 60.0, &input, &mut backend, &mut panel);
        }
        assert_eq!(session.pose().position, Vec3::new(0.0, 1.6, 0.0));
    }

    #[test]
    fn lock_request_then_walk_reaches_proximity() {
        let mut session = session();
        let mut backend = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        let lock = FrameInput {
            lock_requests: vec![LockRequest::Lock],
            ..frame()
        };
        session.tick(0.0, &lock, &mut backend, &mut panel);
        assert!(session.controller().is_locked());

        let walk = FrameInput {
            movement: MoveFlags {
                forward: true,
                ..MoveFlags::default()
            },
            ..frame()
        };
        let mut nearby = None;
        for _ in 0..600 {
            nearby = session.tick(1.0 / 60.0, &walk, &mut backend, &mut panel).nearby;
            if nearby.is_some() {
                break;
            }
        }
        assert_eq!(nearby, session.exhibits().find("north"));
        assert_eq!(panel.shown.last().map(String::as_str), Some("North"));
    }

    #[test]
    fn focus_lost_stops_the_walk() {
        let mut session = session();
        let mut backend = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        session.controller_mut().lock();
        let walk = FrameInput {
            movement: MoveFlags {
                forward: true,
                ..MoveFlags::default()
            },
            ..frame()
        };
        for _ in 0..30 {
            session.tick(1.0 / 60.0, &walk, &mut backend, &mut panel);
        }
        let lost = FrameInput {
            lock_requests: vec![LockRequest::FocusLost],
            ..walk.clone()
        };
        session.tick(1.0 / 60.0, &lost, &mut backend, &mut panel);
        let stopped_at = session.pose().position;
        session.tick(1.0 / 60.0, &walk, &mut backend, &mut panel);
        assert!(!session.controller().is_locked());
        assert_eq!(session.pose().position, stopped_at);
    }

    #[test]
    fn long_frames_are_truncated() {
        let mut session = session();
        let mut backend = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        session.controller_mut().lock();
        session.controller_mut().set_position(Vec3::new(0.0, 5.0, 0.0));
        session.tick(5.0, &frame(), &mut backend, &mut panel);
        // One clamped step of free fall from rest: 30 * 0.1 * 0.1 = 0.3.
        assert!((session.pose().position.y - 4.7).abs() < 1e-4);
    }
}
