use crate::config::VisDriver;
use crate::error::{Result, VisError};
use crate::subsystem::GeometryModel;

/// Scene operations forwarded from `/vis/...` directives.
pub trait VisualizationService {
    fn initialize(&mut self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// `command` is the directive without its `/vis/` prefix.
    fn apply(
        &mut self,
        command: &str,
        args: &str,
        geometry: Option<&dyn GeometryModel>,
    ) -> Result<()>;

    fn shutdown(&mut self);
}

pub fn create(driver: VisDriver) -> Box<dyn VisualizationService> {
    Box::new(TextVisualization::new(driver))
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scene {
    pub viewer: Option<String>,
    pub volumes: Vec<String>,
    pub trajectories: bool,
    pub viewpoint: Option<String>,
}

/// Logs scene operations instead of rendering them.
pub struct TextVisualization {
    driver: VisDriver,
    initialized: bool,
    scene: Scene,
}

impl TextVisualization {
    pub fn new(driver: VisDriver) -> Self {
        Self {
            driver,
            initialized: false,
            scene: Scene::default(),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    fn emit(&self, line: &str) {
        match self.driver {
            VisDriver::Text => tracing::info!(target: "vis", "{}", line),
            VisDriver::Quiet => tracing::debug!(target: "vis", "{}", line),
        }
    }
}

impl VisualizationService for TextVisualization {
    fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        tracing::info!(driver = %self.driver, "visualization initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn apply(
        &mut self,
        command: &str,
        args: &str,
        geometry: Option<&dyn GeometryModel>,
    ) -> Result<()> {
        if !self.initialized {
            return Err(VisError::NotInitialized.into());
        }

        match command {
            "open" => {
                let viewer = args.split_whitespace().next().unwrap_or("TSG");
                self.emit(&format!("viewer opened: {}", viewer));
                self.scene.viewer = Some(viewer.to_string());
            }
            "drawVolume" => {
                let Some(geometry) = geometry else {
                    let reason = "no geometry registered to draw".to_string();
                    return Err(VisError::Command(reason).into());
                };
                let dump = geometry.describe();
                self.emit(&format!("volume: {}", dump));
                self.scene.volumes.push(dump);
            }
            "scene/add/trajectories" => {
                self.scene.trajectories = true;
                self.emit("trajectories added to scene");
            }
            "viewer/set/viewpointThetaPhi" | "viewer/set/viewpointVector" => {
                self.scene.viewpoint = Some(args.trim().to_string());
                self.emit(&format!("viewpoint: {}", args.trim()));
            }
            "disable" | "enable" | "verbose" => self.emit(&format!("{} {}", command, args)),
            c if ["viewer/", "scene/", "modeling/"]
                .iter()
                .any(|prefix| c.starts_with(prefix)) =>
            {
                self.emit(&format!("{} {}", c, args.trim()));
            }
            other => {
                let reason = format!("unknown command /vis/{}", other);
                return Err(VisError::Command(reason).into());
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.initialized {
            let scene = self.scene();
            tracing::info!(
                viewer = ?scene.viewer,
                volumes = scene.volumes.len(),
                trajectories = scene.trajectories,
                viewpoint = ?scene.viewpoint,
                "visualization shut down"
            );
            self.initialized = false;
        }
    }
}
