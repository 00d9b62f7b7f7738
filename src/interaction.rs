//! Exhibit registry, pointer selection and proximity-driven info display.

use std::fmt;

use glam::{Quat, Vec2, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::InteractionConfig;
use crate::math::{intersect_quad, Ray, RayHit};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InteractionError {
    #[error("exhibit id {0:?} is already registered")]
    DuplicateExhibit(String),
    #[error("no exhibit registered under handle {0}")]
    UnknownHandle(usize),
    #[error("exhibit {0:?} has no visual proxy yet")]
    NotReady(String),
}

/// Stable identifier of an exhibit, unique within a gallery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExhibitId(pub String);

impl ExhibitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExhibitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExhibitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Index of an exhibit in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExhibitHandle(usize);

impl ExhibitHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Descriptive record shown in the info panel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExhibitInfo {
    pub title: String,
    pub artist: String,
    pub description: String,
    pub year: String,
}

impl ExhibitInfo {
    /// Panel heading, e.g. `Face Disguise (1921)`.
    pub fn heading(&self) -> String {
        format!("{} ({})", self.title, self.year)
    }

    /// Panel body, e.g. `By Unknown. A mysterious face.`
    pub fn caption(&self) -> String {
        format!("By {}. {}", self.artist, self.description)
    }
}

/// Placement of an exhibit: centre and orientation of its picture plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Transform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Unit normal of the picture plane, pointing into the room.
    pub fn facing(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }
}

/// Shading descriptor applied to an exhibit's visual proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub color: Vec3,
    pub emissive: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            emissive: Vec3::ZERO,
            texture: None,
        }
    }
}

impl Appearance {
    /// Fresh copy with `boost` added to the emissive term.
    pub fn highlighted(&self, boost: Vec3) -> Self {
        Self {
            emissive: self.emissive + boost,
            ..self.clone()
        }
    }
}

/// Visual proxy resolved by the asset loader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExhibitProxy {
    /// Rendered picture size; may differ from the declared footprint once the
    /// image aspect ratio is known.
    pub size: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProxyState {
    Pending,
    Ready(ExhibitProxy),
}

/// A placed artwork.
#[derive(Debug, Clone, PartialEq)]
pub struct Exhibit {
    pub id: ExhibitId,
    pub transform: Transform,
    /// Declared width and height of the picture.
    pub footprint: Vec2,
    pub info: ExhibitInfo,
    selected: bool,
    base: Appearance,
    appearance: Appearance,
    proxy: ProxyState,
}

impl Exhibit {
    pub fn new(
        id: impl Into<ExhibitId>,
        transform: Transform,
        footprint: Vec2,
        info: ExhibitInfo,
        appearance: Appearance,
    ) -> Self {
        Self {
            id: id.into(),
            transform,
            footprint,
            info,
            selected: false,
            base: appearance.clone(),
            appearance,
            proxy: ProxyState::Pending,
        }
    }

    /// Marks the visual proxy as already available.
    pub fn with_proxy(mut self, proxy: ExhibitProxy) -> Self {
        self.proxy = ProxyState::Ready(proxy);
        self
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn base_appearance(&self) -> &Appearance {
        &self.base
    }

    pub fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    pub fn proxy(&self) -> Option<&ExhibitProxy> {
        match &self.proxy {
            ProxyState::Ready(proxy) => Some(proxy),
            ProxyState::Pending => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.proxy, ProxyState::Ready(_))
    }
}

impl From<String> for ExhibitId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pickable surface handed to [`SceneBackend::intersect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickCandidate {
    pub handle: ExhibitHandle,
    pub center: Vec3,
    pub rotation: Quat,
    pub size: Vec2,
}

/// Rendering side of the gallery as seen by the interaction logic.
pub trait SceneBackend {
    /// Swaps the appearance token on the exhibit's visual proxy.
    fn set_appearance(&mut self, id: &ExhibitId, appearance: &Appearance);

    /// Nearest hit among `candidates`; `RayHit::index` indexes the slice.
    fn intersect(&self, ray: &Ray, candidates: &[PickCandidate]) -> Option<RayHit> {
        nearest_hit(ray, candidates)
    }
}

/// Info panel owned by the presentation layer.
pub trait InfoPanel {
    fn show_info(&mut self, info: &ExhibitInfo);
    fn hide_info(&mut self);
}

/// Geometric picking against the candidates' picture planes. Ties keep the
/// earlier candidate.
pub fn nearest_hit(ray: &Ray, candidates: &[PickCandidate]) -> Option<RayHit> {
    let mut best: Option<RayHit> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let Some(t) = intersect_quad(ray, candidate.center, candidate.rotation, candidate.size)
        else {
            continue;
        };
        if best.map_or(true, |hit| t < hit.t) {
            best = Some(RayHit { index, t });
        }
    }
    best
}

/// Tracks registered exhibits and the current selection.
#[derive(Debug, Clone, Default)]
pub struct InteractionManager {
    config: InteractionConfig,
    exhibits: Vec<Exhibit>,
    selected: Option<ExhibitHandle>,
}

impl InteractionManager {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            config,
            exhibits: Vec::new(),
            selected: None,
        }
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    /// Adds an exhibit, snapshotting its current appearance as the base.
    pub fn register(&mut self, mut exhibit: Exhibit) -> Result<ExhibitHandle, InteractionError> {
        if self.find(exhibit.id.as_str()).is_some() {
            return Err(InteractionError::DuplicateExhibit(exhibit.id.0));
        }
        exhibit.base = exhibit.appearance.clone();
        exhibit.selected = false;
        let handle = ExhibitHandle(self.exhibits.len());
        debug!("registered exhibit {} as #{}", exhibit.id, handle.0);
        self.exhibits.push(exhibit);
        Ok(handle)
    }

    /// Attaches the loaded visual proxy to a registered exhibit.
    pub fn resolve_proxy(
        &mut self,
        handle: ExhibitHandle,
        proxy: ExhibitProxy,
    ) -> Result<(), InteractionError> {
        let exhibit = self
            .exhibits
            .get_mut(handle.0)
            .ok_or(InteractionError::UnknownHandle(handle.0))?;
        exhibit.proxy = ProxyState::Ready(proxy);
        Ok(())
    }

    pub fn find(&self, id: &str) -> Option<ExhibitHandle> {
        self.exhibits
            .iter()
            .position(|exhibit| exhibit.id.as_str() == id)
            .map(ExhibitHandle)
    }

    pub fn exhibit(&self, handle: ExhibitHandle) -> Option<&Exhibit> {
        self.exhibits.get(handle.0)
    }

    pub fn exhibits(&self) -> &[Exhibit] {
        &self.exhibits
    }

    pub fn len(&self) -> usize {
        self.exhibits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exhibits.is_empty()
    }

    pub fn selected(&self) -> Option<ExhibitHandle> {
        self.selected
    }

    /// Pick candidates for every exhibit whose proxy is ready.
    pub fn pick_candidates(&self) -> Vec<PickCandidate> {
        self.exhibits
            .iter()
            .enumerate()
            .filter_map(|(index, exhibit)| {
                exhibit.proxy().map(|proxy| PickCandidate {
                    handle: ExhibitHandle(index),
                    center: exhibit.transform.position,
                    rotation: exhibit.transform.rotation,
                    size: proxy.size,
                })
            })
            .collect()
    }

    /// Resolves a click: selects the nearest exhibit under the ray, or clears
    /// the selection when nothing is hit.
    pub fn handle_click(
        &mut self,
        ray: &Ray,
        scene: &mut dyn SceneBackend,
        panel: &mut dyn InfoPanel,
    ) -> Option<ExhibitHandle> {
        let candidates = self.pick_candidates();
        let hit = scene
            .intersect(ray, &candidates)
            .and_then(|hit| candidates.get(hit.index))
            .map(|candidate| candidate.handle);
        match hit {
            Some(handle) => {
                // Candidates only contain ready, registered exhibits.
                if let Err(err) = self.select(handle, scene, panel) {
                    debug!("click ignored: {err}");
                }
            }
            None => self.deselect(scene, panel),
        }
        hit
    }

    pub fn select(
        &mut self,
        handle: ExhibitHandle,
        scene: &mut dyn SceneBackend,
        panel: &mut dyn InfoPanel,
    ) -> Result<(), InteractionError> {
        let target = self
            .exhibits
            .get(handle.0)
            .ok_or(InteractionError::UnknownHandle(handle.0))?;
        if !target.is_ready() {
            return Err(InteractionError::NotReady(target.id.0.clone()));
        }

        if let Some(previous) = self.selected.filter(|&previous| previous != handle) {
            self.restore(previous, scene);
        }

        let boost = self.config.highlight_emissive;
        let exhibit = &mut self.exhibits[handle.0];
        exhibit.appearance = exhibit.base.highlighted(boost);
        exhibit.selected = true;
        scene.set_appearance(&exhibit.id, &exhibit.appearance);
        panel.show_info(&exhibit.info);
        debug!("selected exhibit {}", exhibit.id);
        self.selected = Some(handle);
        Ok(())
    }

    /// Clears the selection. No-op when nothing is selected.
    pub fn deselect(&mut self, scene: &mut dyn SceneBackend, panel: &mut dyn InfoPanel) {
        let Some(previous) = self.selected.take() else {
            return;
        };
        self.restore(previous, scene);
        panel.hide_info();
        debug!("selection cleared");
    }

    fn restore(&mut self, handle: ExhibitHandle, scene: &mut dyn SceneBackend) {
        if let Some(exhibit) = self.exhibits.get_mut(handle.0) {
            exhibit.appearance = exhibit.base.clone();
            exhibit.selected = false;
            scene.set_appearance(&exhibit.id, &exhibit.appearance);
        }
    }

    /// Nearest ready exhibit to `position` and its distance. Ties keep the
    /// earlier registration; exhibits at non-finite distances are skipped.
    pub fn nearest(&self, position: Vec3) -> Option<(ExhibitHandle, f32)> {
        let mut best: Option<(ExhibitHandle, f32)> = None;
        for (index, exhibit) in self.exhibits.iter().enumerate() {
            if !exhibit.is_ready() {
                continue;
            }
            let distance = position.distance(exhibit.transform.position);
            if !distance.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, closest)| distance < closest) {
                best = Some((ExhibitHandle(index), distance));
            }
        }
        best
    }

    /// Per-frame proximity check. Shows the nearest exhibit within the
    /// threshold regardless of selection; hides the panel when nothing is
    /// near and nothing is selected. Returns the exhibit shown, if any.
    pub fn scan_proximity(
        &self,
        position: Vec3,
        panel: &mut dyn InfoPanel,
    ) -> Option<ExhibitHandle> {
        match self.nearest(position) {
            Some((handle, distance)) if distance < self.config.proximity_threshold => {
                panel.show_info(&self.exhibits[handle.0].info);
                Some(handle)
            }
            _ => {
                if self.selected.is_none() {
                    panel.hide_info();
                }
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingPanel {
        pub shown: Vec<String>,
        pub hides: usize,
    }

    impl InfoPanel for RecordingPanel {
        fn show_info(&mut self, info: &ExhibitInfo) {
            self.shown.push(info.title.clone());
        }

        fn hide_info(&mut self) {
            self.hides += 1;
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingScene {
        pub applied: Vec<(String, Appearance)>,
    }

    impl SceneBackend for RecordingScene {
        fn set_appearance(&mut self, id: &ExhibitId, appearance: &Appearance) {
            self.applied.push((id.0.clone(), appearance.clone()));
        }
    }

    pub(crate) fn exhibit(id: &str, position: Vec3) -> Exhibit {
        Exhibit::new(
            id,
            Transform::new(position, Quat::IDENTITY),
            Vec2::new(2.0, 1.5),
            ExhibitInfo {
                title: id.to_uppercase(),
                ..ExhibitInfo::default()
            },
            Appearance {
                color: Vec3::new(0.8, 0.7, 0.6),
                ..Appearance::default()
            },
        )
        .with_proxy(ExhibitProxy {
            size: Vec2::new(2.0, 1.5),
        })
    }

    fn manager(exhibits: Vec<Exhibit>) -> InteractionManager {
        let mut manager = InteractionManager::new(InteractionConfig::default());
        for exhibit in exhibits {
            manager.register(exhibit).unwrap();
        }
        manager
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut m = manager(vec![exhibit("a", Vec3::ZERO)]);
        assert_eq!(
            m.register(exhibit("a", Vec3::ONE)),
            Err(InteractionError::DuplicateExhibit("a".to_string()))
        );
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn selecting_b_restores_a() {
        let mut m = manager(vec![exhibit("a", Vec3::ZERO), exhibit("b", Vec3::X * 5.0)]);
        let (a, b) = (m.find("a").unwrap(), m.find("b").unwrap());
        let mut scene = RecordingScene::default();
        let mut panel = RecordingPanel::default();

        m.select(a, &mut scene, &mut panel).unwrap();
        let highlighted = m.exhibit(a).unwrap().appearance().clone();
        assert_ne!(highlighted, *m.exhibit(a).unwrap().base_appearance());
        assert_eq!(highlighted.emissive, InteractionConfig::default().highlight_emissive);

        m.select(b, &mut scene, &mut panel).unwrap();
        let a_exhibit = m.exhibit(a).unwrap();
        assert_eq!(a_exhibit.appearance(), a_exhibit.base_appearance());
        assert!(!a_exhibit.is_selected());
        assert!(m.exhibit(b).unwrap().is_selected());
        assert_eq!(m.exhibits().iter().filter(|e| e.is_selected()).count(), 1);
        assert_eq!(m.selected(), Some(b));
        assert_eq!(panel.shown, vec!["A", "B"]);
        let restored = &scene.applied[1];
        assert_eq!(restored.0, "a");
        assert_eq!(restored.1, *a_exhibit.base_appearance());
    }

    #[test]
    fn reselecting_does_not_compound_highlight() {
        let mut m = manager(vec![exhibit("a", Vec3::ZERO)]);
        let a = m.find("a").unwrap();
        let mut scene = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        m.select(a, &mut scene, &mut panel).unwrap();
        m.select(a, &mut scene, &mut panel).unwrap();
        let expected = m
            .exhibit(a)
            .unwrap()
            .base_appearance()
            .highlighted(m.config().highlight_emissive);
        assert_eq!(*m.exhibit(a).unwrap().appearance(), expected);
        assert_eq!(m.exhibit(a).unwrap().base_appearance().emissive, Vec3::ZERO);
    }

    #[test]
    fn deselect_without_selection_is_noop() {
        let mut m = manager(vec![exhibit("a", Vec3::ZERO)]);
        let mut scene = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        m.deselect(&mut scene, &mut panel);
        assert_eq!(panel.hides, 0);
        assert!(scene.applied.is_empty());
    }

    #[test]
    fn click_selects_nearest_hit() {
        let mut m = manager(vec![
            exhibit("far", Vec3::new(0.0, 1.6, -8.0)),
            exhibit("near", Vec3::new(0.0, 1.6, -4.0)),
        ]);
        let mut scene = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        let ray = Ray::new(Vec3::new(0.0, 1.6, 0.0), Vec3::NEG_Z);
        let hit = m.handle_click(&ray, &mut scene, &mut panel);
        assert_eq!(hit, m.find("near"));
        assert_eq!(m.selected(), m.find("near"));
    }

    #[test]
    fn click_miss_deselects() {
        let mut m = manager(vec![exhibit("a", Vec3::new(0.0, 1.6, -4.0))]);
        let mut scene = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        let a = m.find("a").unwrap();
        m.select(a, &mut scene, &mut panel).unwrap();

        let ray = Ray::new(Vec3::new(0.0, 1.6, 0.0), Vec3::Z);
        assert_eq!(m.handle_click(&ray, &mut scene, &mut panel), None);
        assert_eq!(m.selected(), None);
        assert_eq!(panel.hides, 1);
        let a = m.exhibit(a).unwrap();
        assert_eq!(a.appearance(), a.base_appearance());
    }

    #[test]
    fn click_on_empty_registry_is_a_miss() {
        let mut m = InteractionManager::default();
        let mut scene = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        assert_eq!(m.handle_click(&ray, &mut scene, &mut panel), None);
        assert_eq!(panel.hides, 0);
    }

    #[test]
    fn pending_exhibits_are_skipped() {
        let mut m = InteractionManager::new(InteractionConfig::default());
        let pending = Exhibit::new(
            "pending",
            Transform::new(Vec3::new(0.0, 1.6, -2.0), Quat::IDENTITY),
            Vec2::ONE,
            ExhibitInfo::default(),
            Appearance::default(),
        );
        let handle = m.register(pending).unwrap();
        let mut scene = RecordingScene::default();
        let mut panel = RecordingPanel::default();

        let ray = Ray::new(Vec3::new(0.0, 1.6, 0.0), Vec3::NEG_Z);
        assert_eq!(m.handle_click(&ray, &mut scene, &mut panel), None);
        assert_eq!(m.scan_proximity(Vec3::new(0.0, 1.6, 0.0), &mut panel), None);
        assert_eq!(
            m.select(handle, &mut scene, &mut panel),
            Err(InteractionError::NotReady("pending".to_string()))
        );

        m.resolve_proxy(handle, ExhibitProxy { size: Vec2::ONE }).unwrap();
        assert_eq!(m.handle_click(&ray, &mut scene, &mut panel), Some(handle));
    }

    #[test]
    fn proximity_shows_nearest_then_hides() {
        let camera = Vec3::new(0.0, 1.6, 0.0);
        let m = manager(vec![
            exhibit("eight", camera + Vec3::X * 8.0),
            exhibit("three", camera + Vec3::NEG_Z * 3.0),
            exhibit("twelve", camera + Vec3::Z * 12.0),
        ]);
        let mut panel = RecordingPanel::default();
        assert_eq!(m.scan_proximity(camera, &mut panel), m.find("three"));
        assert_eq!(panel.shown, vec!["THREE"]);

        let far = camera + Vec3::new(0.0, 0.0, 30.0);
        assert_eq!(m.scan_proximity(far, &mut panel), None);
        assert_eq!(panel.hides, 1);
    }

    #[test]
    fn proximity_keeps_panel_for_selection() {
        let mut m = manager(vec![exhibit("a", Vec3::ZERO)]);
        let mut scene = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        let a = m.find("a").unwrap();
        m.select(a, &mut scene, &mut panel).unwrap();
        assert_eq!(m.scan_proximity(Vec3::splat(100.0), &mut panel), None);
        assert_eq!(panel.hides, 0);
    }

    #[test]
    fn proximity_overrides_selection_for_display_only() {
        let mut m = manager(vec![exhibit("a", Vec3::ZERO), exhibit("b", Vec3::X * 20.0)]);
        let mut scene = RecordingScene::default();
        let mut panel = RecordingPanel::default();
        let (a, b) = (m.find("a").unwrap(), m.find("b").unwrap());
        m.select(b, &mut scene, &mut panel).unwrap();
        let applied = scene.applied.len();
        assert_eq!(m.scan_proximity(Vec3::X, &mut panel), Some(a));
        assert_eq!(panel.shown.last().map(String::as_str), Some("A"));
        assert_eq!(m.selected(), Some(b));
        assert_eq!(scene.applied.len(), applied);
        assert!(!m.exhibit(a).unwrap().is_selected());
    }

    #[test]
    fn non_finite_placement_does_not_hide_nearby_exhibits() {
        let camera = Vec3::new(0.0, 1.6, 0.0);
        let m = manager(vec![
            exhibit("bad", Vec3::new(f32::NAN, 1.6, 0.0)),
            exhibit("near", Vec3::new(0.0, 1.6, -2.0)),
        ]);
        let mut panel = RecordingPanel::default();
        assert_eq!(m.scan_proximity(camera, &mut panel), m.find("near"));
        assert_eq!(panel.shown, vec!["NEAR"]);
        assert_eq!(panel.hides, 0);
    }

    #[test]
    fn equal_distances_prefer_first_registered() {
        let camera = Vec3::ZERO;
        let m = manager(vec![
            exhibit("first", Vec3::new(4.0, 0.0, 0.0)),
            exhibit("second", Vec3::new(-4.0, 0.0, 0.0)),
        ]);
        let mut panel = RecordingPanel::default();
        assert_eq!(m.scan_proximity(camera, &mut panel), m.find("first"));
        assert_eq!(panel.shown, vec!["FIRST"]);
    }

    #[test]
    fn info_formats_heading_and_caption() {
        let info = ExhibitInfo {
            title: "Three Sisters".into(),
            artist: "Unknown".into(),
            description: "A bond of sisterhood.".into(),
            year: "1999".into(),
        };
        assert_eq!(info.heading(), "Three Sisters (1999)");
        assert_eq!(info.caption(), "By Unknown. A bond of sisterhood.");
    }
}
