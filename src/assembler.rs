use std::sync::Arc;

use crate::config::RunConfiguration;
use crate::error::Result;
use crate::run_manager::RunManager;
use crate::subsystem::{EventAction, GeometryModel, PhysicsModel, Subsystem};

/// Builds the three mandatory collaborators.
pub trait SubsystemFactory {
    fn physics(&self) -> Result<Arc<dyn PhysicsModel>>;

    fn geometry(&self) -> Result<Arc<dyn GeometryModel>>;

    /// Called only after `geometry` has been built and registered.
    fn action(
        &self,
        geometry: Arc<dyn GeometryModel>,
        output_artifact_name: &str,
    ) -> Result<Arc<dyn EventAction>>;
}

/// Register physics, geometry and event action with `run_manager`, in that order.
pub fn assemble(
    run: &RunConfiguration,
    factory: &dyn SubsystemFactory,
    run_manager: &mut dyn RunManager,
) -> Result<()> {
    let physics = factory.physics()?;
    tracing::debug!(physics = physics.name(), "physics model constructed");
    run_manager.register(Subsystem::Physics(physics))?;

    let geometry = factory.geometry()?;
    tracing::debug!(geometry = geometry.name(), "geometry model constructed");
    run_manager.register(Subsystem::Geometry(Arc::clone(&geometry)))?;

    let action = factory.action(geometry, &run.output_artifact_name)?;
    run_manager.register(Subsystem::Action(action))?;

    tracing::info!(
        manager = %run_manager.kind(),
        registered = ?run_manager.registered(),
        output = %run.output_artifact_name,
        "subsystems assembled"
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::RunManagerKind;
    use crate::run_manager;
    use crate::subsystem::tests::{CollectingAction, EvenPhysics, FixedGeometry};
    use crate::subsystem::SubsystemKind;
    use std::sync::Mutex;

    /// Records every factory call and the output name handed to the action.
    #[derive(Default)]
    pub struct RecordingFactory {
        pub calls: Mutex<Vec<&'static str>>,
        pub output: Mutex<Option<String>>,
        pub geometry_seen: Mutex<Option<String>>,
    }

    impl SubsystemFactory for RecordingFactory {
        fn physics(&self) -> Result<Arc<dyn PhysicsModel>> {
            self.calls.lock().unwrap().push("physics");
            Ok(Arc::new(EvenPhysics))
        }

        fn geometry(&self) -> Result<Arc<dyn GeometryModel>> {
            self.calls.lock().unwrap().push("geometry");
            Ok(Arc::new(FixedGeometry))
        }

        fn action(
            &self,
            geometry: Arc<dyn GeometryModel>,
            output_artifact_name: &str,
        ) -> Result<Arc<dyn EventAction>> {
            self.calls.lock().unwrap().push("action");
            *self.geometry_seen.lock().unwrap() = Some(geometry.name().to_string());
            *self.output.lock().unwrap() = Some(output_artifact_name.to_string());
            Ok(Arc::new(CollectingAction::default()))
        }
    }

    fn run_config() -> RunConfiguration {
        RunConfiguration {
            output_artifact_name: "run42.root".to_string(),
            macro_directory: "macros".to_string(),
            macro_path: None,
        }
    }

    #[test]
    fn registers_in_order_for_both_variants() {
        for kind in [RunManagerKind::Serial, RunManagerKind::Parallel] {
            let factory = RecordingFactory::default();
            let mut rm = run_manager::create(kind, 2, 1);
            assemble(&run_config(), &factory, rm.as_mut()).unwrap();

            assert_eq!(rm.registered(), SubsystemKind::ORDER.to_vec());
            assert_eq!(
                *factory.calls.lock().unwrap(),
                vec!["physics", "geometry", "action"]
            );
        }
    }

    #[test]
    fn action_is_bound_to_geometry_and_output() {
        let factory = RecordingFactory::default();
        let mut rm = run_manager::create(RunManagerKind::Serial, 1, 1);
        assemble(&run_config(), &factory, rm.as_mut()).unwrap();

        assert_eq!(factory.output.lock().unwrap().as_deref(), Some("run42.root"));
        assert_eq!(factory.geometry_seen.lock().unwrap().as_deref(), Some("fixed"));
        let registered = rm.geometry().unwrap();
        assert_eq!(registered.name(), "fixed");
    }

    #[test]
    fn second_assembly_is_rejected() {
        let factory = RecordingFactory::default();
        let mut rm = run_manager::create(RunManagerKind::Serial, 1, 1);
        assemble(&run_config(), &factory, rm.as_mut()).unwrap();
        assert_eq!(assemble(&run_config(), &factory, rm.as_mut()).unwrap_err().exit_status(), 3);
    }
}
