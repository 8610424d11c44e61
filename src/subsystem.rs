use rand::RngCore;
use std::fmt;
use std::sync::Arc;

use crate::error::{AssemblyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemKind {
    Physics,
    Geometry,
    Action,
}

impl SubsystemKind {
    /// Registration order expected by every run manager.
    pub const ORDER: [SubsystemKind; 3] = [
        SubsystemKind::Physics,
        SubsystemKind::Geometry,
        SubsystemKind::Action,
    ];
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsystemKind::Physics => write!(f, "physics model"),
            SubsystemKind::Geometry => write!(f, "geometry model"),
            SubsystemKind::Action => write!(f, "event action"),
        }
    }
}

/// Outcome of tracking one primary through the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event_id: u64,
    pub converted: bool,
    /// Conversion depth, or the full thickness when the primary escaped.
    pub depth_cm: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: u32,
    pub events_requested: u64,
    pub events_processed: u64,
    pub aborted: bool,
}

pub trait GeometryModel: Send + Sync {
    fn name(&self) -> &str;
    fn thickness_cm(&self) -> f64;
    fn radiation_length_cm(&self) -> f64;

    /// Human readable dump used by `/vis/drawVolume`.
    fn describe(&self) -> String {
        format!(
            "{} (thickness {} cm, X0 {} cm)",
            self.name(),
            self.thickness_cm(),
            self.radiation_length_cm()
        )
    }
}

pub trait PhysicsModel: Send + Sync {
    fn name(&self) -> &str;
    fn transport(
        &self,
        event_id: u64,
        geometry: &dyn GeometryModel,
        rng: &mut dyn RngCore,
    ) -> EventRecord;
}

pub trait EventAction: Send + Sync {
    fn begin_of_run(&self, _run_id: u32, _events: u64) -> Result<()> {
        Ok(())
    }

    /// May be called concurrently and out of event order by the parallel manager.
    fn end_of_event(&self, record: &EventRecord);

    fn end_of_run(&self, summary: &RunSummary) -> Result<()>;
}

#[derive(Clone)]
pub enum Subsystem {
    Physics(Arc<dyn PhysicsModel>),
    Geometry(Arc<dyn GeometryModel>),
    Action(Arc<dyn EventAction>),
}

impl Subsystem {
    pub fn kind(&self) -> SubsystemKind {
        match self {
            Subsystem::Physics(_) => SubsystemKind::Physics,
            Subsystem::Geometry(_) => SubsystemKind::Geometry,
            Subsystem::Action(_) => SubsystemKind::Action,
        }
    }
}

impl fmt::Debug for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subsystem({})", self.kind())
    }
}

/// The three mandatory collaborators, filled strictly in [`SubsystemKind::ORDER`].
#[derive(Default)]
pub struct SubsystemSet {
    physics: Option<Arc<dyn PhysicsModel>>,
    geometry: Option<Arc<dyn GeometryModel>>,
    action: Option<Arc<dyn EventAction>>,
}

/// Borrowed view over a completely registered set.
pub struct Registered<'a> {
    pub physics: &'a Arc<dyn PhysicsModel>,
    pub geometry: &'a Arc<dyn GeometryModel>,
    pub action: &'a Arc<dyn EventAction>,
}

impl SubsystemSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn registered_count(&self) -> usize {
        usize::from(self.physics.is_some())
            + usize::from(self.geometry.is_some())
            + usize::from(self.action.is_some())
    }

    /// Next kind the set will accept, or `None` once complete.
    pub fn expected(&self) -> Option<SubsystemKind> {
        SubsystemKind::ORDER.get(self.registered_count()).copied()
    }

    pub fn register(&mut self, subsystem: Subsystem) -> Result<(), AssemblyError> {
        let got = subsystem.kind();
        let Some(expected) = self.expected() else {
            return Err(AssemblyError::AlreadyRegistered(got));
        };
        if got != expected {
            if self.registered_kinds().contains(&got) {
                return Err(AssemblyError::AlreadyRegistered(got));
            }
            return Err(AssemblyError::OutOfOrder { expected, got });
        }

        match subsystem {
            Subsystem::Physics(p) => self.physics = Some(p),
            Subsystem::Geometry(g) => self.geometry = Some(g),
            Subsystem::Action(a) => self.action = Some(a),
        }
        Ok(())
    }

    pub fn registered_kinds(&self) -> Vec<SubsystemKind> {
        SubsystemKind::ORDER[..self.registered_count()].to_vec()
    }

    pub fn geometry(&self) -> Option<Arc<dyn GeometryModel>> {
        self.geometry.clone()
    }

    pub fn complete(&self) -> Result<Registered<'_>, AssemblyError> {
        match (&self.physics, &self.geometry, &self.action) {
            (Some(physics), Some(geometry), Some(action)) => Ok(Registered {
                physics,
                geometry,
                action,
            }),
            _ => Err(AssemblyError::Incomplete(
                self.expected().unwrap_or(SubsystemKind::Action),
            )),
        }
    }
}
