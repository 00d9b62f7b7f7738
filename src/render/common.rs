use glam::{Mat4, Quat, Vec3};

use crate::interaction::InteractionManager;
use crate::scene::{LightKind, Scene, FRAME_BORDER};

const WALL_COLOR: Vec3 = Vec3::new(0.93, 0.92, 0.9);
const PICTURE_DEPTH: f32 = 0.02;
const FRAME_DEPTH: f32 = 0.06;

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub ambient: Vec3,
}

impl LightParams {
    /// Collapses the scene's light rig into one key light plus ambient term.
    pub fn from_scene(scene: &Scene) -> Self {
        let rig = scene.light_rig();
        let ambient = rig
            .iter()
            .filter(|light| light.kind == LightKind::Ambient)
            .map(|light| light.color * light.intensity)
            .fold(None, |sum: Option<Vec3>, term| Some(sum.unwrap_or(Vec3::ZERO) + term))
            .unwrap_or(Vec3::splat(0.15));
        let room = scene.room();
        rig.iter()
            .find(|light| matches!(light.kind, LightKind::Point | LightKind::Spot))
            .map(|light| Self {
                position: light.position,
                color: light.color,
                intensity: light.intensity.max(0.1),
                ambient,
            })
            .unwrap_or(Self {
                position: Vec3::new(0.0, room.height * 0.9, 0.0),
                color: Vec3::ONE,
                intensity: 1.0,
                ambient,
            })
    }
}

/// One box to draw: a unit cube transformed by `model`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub model: Mat4,
    pub color: Vec3,
    pub emissive: Vec3,
    /// Seen from inside; normals point inwards.
    pub inside: bool,
}

impl DrawItem {
    fn solid(center: Vec3, rotation: Quat, scale: Vec3, color: Vec3) -> Self {
        Self {
            model: Mat4::from_scale_rotation_translation(scale, rotation, center),
            color,
            emissive: Vec3::ZERO,
            inside: false,
        }
    }
}

/// Builds the draw list for the room shell, exhibit frames and every exhibit
/// whose proxy is ready, using each exhibit's current appearance.
pub fn draw_list(scene: &Scene, manager: &InteractionManager) -> Vec<DrawItem> {
    let room = scene.room();
    let mut items = vec![DrawItem {
        model: Mat4::from_scale_rotation_translation(
            Vec3::new(room.width, room.height, room.length),
            Quat::IDENTITY,
            Vec3::new(0.0, room.height / 2.0, 0.0),
        ),
        color: WALL_COLOR,
        emissive: Vec3::ZERO,
        inside: true,
    }];

    for placement in &scene.exhibits {
        let Some(exhibit) = manager
            .find(&placement.id)
            .and_then(|handle| manager.exhibit(handle))
        else {
            continue;
        };
        let rotation = exhibit.transform.rotation;
        let facing = exhibit.transform.facing();
        let size = exhibit
            .proxy()
            .map(|proxy| proxy.size)
            .unwrap_or(exhibit.footprint);

        if let Some(frame) = placement.frame {
            items.push(DrawItem::solid(
                exhibit.transform.position - facing * (FRAME_DEPTH / 2.0),
                rotation,
                (size + 2.0 * FRAME_BORDER).extend(FRAME_DEPTH),
                frame,
            ));
        }
        if exhibit.is_ready() {
            let appearance = exhibit.appearance();
            let mut picture = DrawItem::solid(
                exhibit.transform.position,
                rotation,
                size.extend(PICTURE_DEPTH),
                appearance.color,
            );
            picture.emissive = appearance.emissive;
            items.push(picture);
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::tests::{RecordingPanel, RecordingScene};
    use crate::interaction::ExhibitProxy;
    use glam::Vec2;

    const GALLERY: &str = r#"
    <gallery>
        <exhibit><id>a</id><position>0 2 -9.9</position><frame/></exhibit>
        <exhibit><id>b</id><position>4 2 -9.9</position></exhibit>
        <light><type>spot</type><position>0 5 0</position><intensity>2</intensity></light>
    </gallery>
    "#;

    fn assembled(scene: &Scene) -> InteractionManager {
        let mut manager = InteractionManager::new(scene.config.interaction);
        for placement in &scene.exhibits {
            manager.register(placement.to_exhibit()).unwrap();
        }
        manager
    }

    #[test]
    fn pending_exhibits_draw_only_their_frame() {
        let scene = Scene::from_xml(GALLERY).unwrap();
        let manager = assembled(&scene);
        let items = draw_list(&scene, &manager);
        // room + frame of `a`
        assert_eq!(items.len(), 2);
        assert!(items[0].inside);
    }

    #[test]
    fn selected_exhibit_draws_highlighted() {
        let scene = Scene::from_xml(GALLERY).unwrap();
        let mut manager = assembled(&scene);
        for index in 0..2 {
            let handle = manager.find(&scene.exhibits[index].id).unwrap();
            manager
                .resolve_proxy(handle, ExhibitProxy { size: Vec2::ONE })
                .unwrap();
        }
        let handle = manager.find("b").unwrap();
        let mut backend = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        manager.select(handle, &mut backend, &mut panel).unwrap();

        let items = draw_list(&scene, &manager);
        assert_eq!(items.len(), 4);
        let picture_b = items.last().unwrap();
        assert_eq!(picture_b.emissive, manager.config().highlight_emissive);
        assert_eq!(items[2].emissive, Vec3::ZERO);
    }

    #[test]
    fn key_light_prefers_rig_spot() {
        let scene = Scene::from_xml(GALLERY).unwrap();
        let light = LightParams::from_scene(&scene);
        assert_eq!(light.position, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(light.intensity, 2.0);
        assert_eq!(light.ambient, Vec3::splat(0.15));
    }
}
