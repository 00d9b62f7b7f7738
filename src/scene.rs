use std::f32::consts::PI;

use anyhow::{anyhow, bail, Context, Result};
use glam::{Quat, Vec2, Vec3};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::config::{GalleryConfig, RoomBounds};
use crate::interaction::{Appearance, Exhibit, ExhibitInfo, Transform};
use crate::locomotion::Pose;
use crate::math::rotation_from_degrees;

/// Width of the border drawn around framed exhibits.
pub const FRAME_BORDER: f32 = 0.1;

/// Gallery descriptor: room, start pose, exhibit placements and light rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    pub config: GalleryConfig,
    pub start: StartPose,
    pub exhibits: Vec<ExhibitPlacement>,
    pub lights: Vec<Light>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartPose {
    pub position: Vec3,
    /// Degrees.
    pub yaw: f32,
}

impl Default for StartPose {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.6, 20.0 / 3.0),
            yaw: 0.0,
        }
    }
}

impl StartPose {
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.yaw.to_radians())
    }
}

impl Scene {
    /// Parses a `<gallery>` descriptor.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid gallery XML")?;
        let root = document.root_element();
        if !root.has_tag_name("gallery") {
            return Err(anyhow!(
                "expected <gallery> root element, found <{}>",
                root.tag_name().name()
            ));
        }

        let mut config = GalleryConfig::default();
        if let Some(room) = child(&root, "room") {
            config.room = parse_room(&room, config.room)?;
        }
        if let Some(controls) = child(&root, "controls") {
            parse_controls(&controls, &mut config)?;
        }
        config.validate().context("invalid gallery configuration")?;

        let mut start = StartPose {
            position: Vec3::new(0.0, config.room.eye_height, config.room.length / 3.0),
            yaw: 0.0,
        };
        if let Some(node) = child(&root, "start") {
            start.position = parse_vec3(optional_text(&node, "position"), start.position)?;
            start.yaw = parse_f32(optional_text(&node, "yaw"), start.yaw)?;
        }

        let mut exhibits = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("exhibit")) {
            let placement = ExhibitPlacement::from_node(&node)
                .with_context(|| format!("invalid exhibit #{}", exhibits.len() + 1))?;
            exhibits.push(placement);
        }

        let mut lights = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("light")) {
            lights.push(Light::from_node(&node).context("invalid light")?);
        }

        Ok(Self {
            config,
            start,
            exhibits,
            lights,
        })
    }

    /// Explicit lights followed by one spot light per exhibit that asks for it.
    pub fn light_rig(&self) -> Vec<Light> {
        let mut rig = self.lights.clone();
        rig.extend(self.exhibits.iter().filter_map(ExhibitPlacement::spotlight));
        rig
    }

    pub fn room(&self) -> &RoomBounds {
        &self.config.room
    }
}

/// One exhibit as declared in the descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhibitPlacement {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub position: Vec3,
    /// Euler degrees, applied Y, X, Z.
    pub rotation: Vec3,
    pub size: Vec2,
    pub info: ExhibitInfo,
    pub color: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotlight: Option<Vec3>,
}

impl ExhibitPlacement {
    fn from_node(node: &Node<'_, '_>) -> Result<Self> {
        let size = parse_vec2(optional_text(node, "size"), Vec2::new(3.5, 2.5))?;
        if size.x <= 0.0 || size.y <= 0.0 {
            return Err(anyhow!("exhibit size must be positive"));
        }
        Ok(Self {
            id: required_text(node, "id")?,
            source: optional_text(node, "source"),
            position: parse_vec3(optional_text(node, "position"), Vec3::ZERO)?,
            rotation: parse_vec3(optional_text(node, "rotation"), Vec3::ZERO)?,
            size,
            info: ExhibitInfo {
                title: optional_text(node, "title").unwrap_or_default(),
                artist: optional_text(node, "artist").unwrap_or_else(|| "Unknown".to_string()),
                description: optional_text(node, "description").unwrap_or_default(),
                year: optional_text(node, "year").unwrap_or_else(|| "Unknown".to_string()),
            },
            color: parse_color(optional_text(node, "color"), Vec3::ONE)?,
            frame: optional_color(node, "frame", Vec3::new(0.545, 0.271, 0.075))?,
            spotlight: optional_color(node, "spotlight", Vec3::ONE)?,
        })
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.rotation_quat())
    }

    pub fn rotation_quat(&self) -> Quat {
        rotation_from_degrees(self.rotation)
    }

    pub fn appearance(&self) -> Appearance {
        Appearance {
            color: self.color,
            emissive: Vec3::ZERO,
            texture: self.source.clone(),
        }
    }

    /// Registry entry for this placement, with its visual proxy pending.
    pub fn to_exhibit(&self) -> Exhibit {
        Exhibit::new(
            self.id.as_str(),
            self.transform(),
            self.size,
            self.info.clone(),
            self.appearance(),
        )
    }

    /// Spot light three units in front of the picture, aimed at its centre.
    pub fn spotlight(&self) -> Option<Light> {
        let color = self.spotlight?;
        let facing = self.transform().facing();
        Some(Light {
            kind: LightKind::Spot,
            position: self.position + facing * 3.0,
            target: Some(self.position),
            color,
            intensity: 1.5,
            angle: PI / 6.0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

/// Light rig entry. Consumed by renderers only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec3>,
    pub color: Vec3,
    pub intensity: f32,
    /// Cone half-angle in radians for spot lights.
    pub angle: f32,
}

impl Light {
    fn from_node(node: &Node<'_, '_>) -> Result<Self> {
        let kind = match optional_text(node, "type").as_deref() {
            Some("ambient") => LightKind::Ambient,
            Some("directional") => LightKind::Directional,
            Some("point") | None => LightKind::Point,
            Some("spot") => LightKind::Spot,
            Some(other) => return Err(anyhow!("unknown light type {other:?}")),
        };
        let target = match optional_text(node, "target") {
            Some(text) => Some(parse_vec3(Some(text), Vec3::ZERO)?),
            None => None,
        };
        Ok(Self {
            kind,
            position: parse_vec3(optional_text(node, "position"), Vec3::ZERO)?,
            target,
            color: parse_color(optional_text(node, "color"), Vec3::ONE)?,
            intensity: parse_f32(optional_text(node, "intensity"), 1.0)?,
            angle: parse_f32(optional_text(node, "angle"), 22.5)?.to_radians(),
        })
    }
}

fn parse_room(node: &Node<'_, '_>, defaults: RoomBounds) -> Result<RoomBounds> {
    Ok(RoomBounds {
        width: parse_f32(optional_text(node, "width"), defaults.width)?,
        length: parse_f32(optional_text(node, "length"), defaults.length)?,
        height: parse_f32(optional_text(node, "height"), defaults.height)?,
        wall_margin: parse_f32(optional_text(node, "wall-margin"), defaults.wall_margin)?,
        eye_height: parse_f32(optional_text(node, "eye-height"), defaults.eye_height)?,
    })
}

fn parse_controls(node: &Node<'_, '_>, config: &mut GalleryConfig) -> Result<()> {
    let motion = &mut config.locomotion;
    motion.damping = parse_f32(optional_text(node, "damping"), motion.damping)?;
    motion.gravity = parse_f32(optional_text(node, "gravity"), motion.gravity)?;
    motion.speed = parse_f32(optional_text(node, "speed"), motion.speed)?;
    motion.jump_velocity = parse_f32(optional_text(node, "jump-velocity"), motion.jump_velocity)?;
    if let Some(degrees) = optional_text(node, "max-pitch") {
        motion.max_pitch = parse_f32(Some(degrees), 0.0)?.to_radians();
    }
    motion.pointer_sensitivity = parse_f32(
        optional_text(node, "pointer-sensitivity"),
        motion.pointer_sensitivity,
    )?;
    motion.touch_sensitivity = parse_f32(
        optional_text(node, "touch-sensitivity"),
        motion.touch_sensitivity,
    )?;
    motion.joystick_speed =
        parse_f32(optional_text(node, "joystick-speed"), motion.joystick_speed)?;

    let interaction = &mut config.interaction;
    interaction.proximity_threshold = parse_f32(
        optional_text(node, "proximity"),
        interaction.proximity_threshold,
    )?;
    interaction.highlight_emissive = parse_color(
        optional_text(node, "highlight"),
        interaction.highlight_emissive,
    )?;

    config.camera.fov = parse_f32(optional_text(node, "fov"), config.camera.fov)?;
    Ok(())
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

/// A colour tag that may be present but empty (`<frame/>`), meaning "use the default".
fn optional_color(node: &Node<'_, '_>, tag: &str, default: Vec3) -> Result<Option<Vec3>> {
    let Some(element) = child(node, tag) else {
        return Ok(None);
    };
    let text = element.text().map(str::trim).filter(|t| !t.is_empty());
    match text {
        None | Some("true") => Ok(Some(default)),
        Some("false") => Ok(None),
        Some(value) => parse_color(Some(value.to_string()), default).map(Some),
    }
}

fn parse_numbers<const N: usize>(value: &str, what: &str) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    let mut parts = value.split_whitespace();
    for slot in out.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| anyhow!("{what} is missing components"))?;
        *slot = part
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse {what} component {part:?}: {err}"))?;
        if !slot.is_finite() {
            bail!("{what} component {part:?} is not a finite number");
        }
    }
    Ok(out)
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => parse_numbers::<3>(&value, "vector").map(Vec3::from_array),
        None => Ok(default),
    }
}

fn parse_vec2(value: Option<String>, default: Vec2) -> Result<Vec2> {
    match value {
        Some(value) => parse_numbers::<2>(&value, "size").map(Vec2::from_array),
        None => Ok(default),
    }
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => parse_numbers::<3>(&value, "color").map(|rgb| Vec3::from_array(rgb) / 255.0),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => {
            let parsed = value
                .parse::<f32>()
                .map_err(|err| anyhow!("failed to parse float {value:?}: {err}"))?;
            if !parsed.is_finite() {
                bail!("float {value:?} is not a finite number");
            }
            Ok(parsed)
        }
        None => Ok(default),
    }
}
