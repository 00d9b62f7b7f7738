use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::{info, warn};

use crate::interaction::{ExhibitHandle, ExhibitProxy, InteractionManager};
use crate::scene::{ExhibitPlacement, Scene};

/// Produces the visual proxy for one exhibit. Loads may finish in any order;
/// until one does, the exhibit stays registered but unready.
#[allow(async_fn_in_trait)]
pub trait ExhibitLoader {
    async fn load_exhibit(&self, placement: &ExhibitPlacement) -> Result<ExhibitProxy>;
}

/// Resolves exhibit sources against a directory on disk. The proxy keeps the
/// declared size; exhibits without a source become plain coloured panels.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Loader rooted at the directory containing `descriptor`.
    pub fn for_descriptor(descriptor: &Path) -> Self {
        let root = descriptor
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ExhibitLoader for FileLoader {
    async fn load_exhibit(&self, placement: &ExhibitPlacement) -> Result<ExhibitProxy> {
        if let Some(source) = &placement.source {
            let path = self.root.join(source);
            if !path.is_file() {
                return Err(anyhow!("image {} not found", path.display()));
            }
        }
        Ok(ExhibitProxy {
            size: placement.size,
        })
    }
}

/// Outcome of [`assemble`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyReport {
    pub registered: Vec<ExhibitHandle>,
    /// Exhibits whose proxy failed to load, with the reason.
    pub failed: Vec<(String, String)>,
}

impl AssemblyReport {
    pub fn ready(&self) -> usize {
        self.registered.len() - self.failed.len()
    }
}

/// Registers every exhibit of `scene` as a pending placeholder, then loads
/// and resolves each proxy. Failures are logged and leave the exhibit
/// unready; duplicate ids are fatal.
pub async fn assemble<L: ExhibitLoader>(
    scene: &Scene,
    manager: &mut InteractionManager,
    loader: &L,
) -> Result<AssemblyReport> {
    let mut report = AssemblyReport::default();
    for placement in &scene.exhibits {
        let handle = manager.register(placement.to_exhibit())?;
        report.registered.push(handle);
    }

    for (placement, &handle) in scene.exhibits.iter().zip(&report.registered) {
        match loader.load_exhibit(placement).await {
            Ok(proxy) => manager.resolve_proxy(handle, proxy)?,
            Err(err) => {
                warn!("exhibit {} left unloaded: {err:#}", placement.id);
                report.failed.push((placement.id.clone(), format!("{err:#}")));
            }
        }
    }

    info!(
        "assembled gallery: {} exhibits, {} ready",
        report.registered.len(),
        report.ready()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InteractionError;
    use glam::Vec2;
    use std::fs;
    use tempfile::tempdir;

    const GALLERY: &str = r#"
    <gallery>
        <exhibit><id>a</id><source>a.png</source><position>0 2 -9</position></exhibit>
        <exhibit><id>b</id><source>missing.png</source><position>4 2 -9</position></exhibit>
        <exhibit><id>c</id><position>-4 2 -9</position><size>1 1</size></exhibit>
    </gallery>
    "#;

    #[test]
    fn file_loader_resolves_present_sources() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.png"), b"png").unwrap();
        let scene = Scene::from_xml(GALLERY).unwrap();
        let mut manager = InteractionManager::new(scene.config.interaction);

        let report =
            pollster::block_on(assemble(&scene, &mut manager, &FileLoader::new(dir.path())))
                .unwrap();

        assert_eq!(report.registered.len(), 3);
        assert_eq!(report.ready(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b");
        assert!(manager.exhibits()[0].is_ready());
        assert!(!manager.exhibits()[1].is_ready());
        assert_eq!(
            manager.exhibits()[2].proxy().map(|proxy| proxy.size),
            Some(Vec2::ONE)
        );
    }

    #[test]
    fn unready_exhibits_are_ignored_by_proximity() {
        let dir = tempdir().unwrap();
        let scene = Scene::from_xml(GALLERY).unwrap();
        let mut manager = InteractionManager::new(scene.config.interaction);
        pollster::block_on(assemble(&scene, &mut manager, &FileLoader::new(dir.path()))).unwrap();

        // Only `c` has no source to fail on.
        let (handle, _) = manager.nearest(glam::Vec3::new(0.0, 2.0, -9.0)).unwrap();
        assert_eq!(manager.exhibit(handle).unwrap().id.as_str(), "c");
    }

    #[test]
    fn duplicate_ids_abort_assembly() {
        let scene = Scene::from_xml(
            "<gallery><exhibit><id>x</id></exhibit><exhibit><id>x</id></exhibit></gallery>",
        )
        .unwrap();
        let mut manager = InteractionManager::default();
        let err = pollster::block_on(assemble(&scene, &mut manager, &FileLoader::new(".")))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<InteractionError>(),
            Some(&InteractionError::DuplicateExhibit("x".into()))
        );
    }

    #[test]
    fn loader_root_follows_descriptor() {
        let loader = FileLoader::for_descriptor(Path::new("galleries/main.xml"));
        assert_eq!(loader.root(), Path::new("galleries"));
    }
}
