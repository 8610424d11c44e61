use std::path::{Path, PathBuf};

use crate::error::{BootstrapError, InterpreterError, Result};
use crate::run_manager::RunManager;
use crate::vis::VisualizationService;

/// Nested `/control/execute` calls beyond this depth are rejected.
pub const MAX_MACRO_DEPTH: usize = 16;

/// Executes textual control directives against the assembled simulation.
pub struct CommandInterpreter<'a> {
    run_manager: &'a mut dyn RunManager,
    vis: &'a mut dyn VisualizationService,
    search_path: Vec<PathBuf>,
    verbose: u32,
    depth: usize,
    history: Vec<String>,
}

impl<'a> CommandInterpreter<'a> {
    pub fn new(run_manager: &'a mut dyn RunManager, vis: &'a mut dyn VisualizationService) -> Self {
        Self {
            run_manager,
            vis,
            search_path: Vec::new(),
            verbose: 0,
            depth: 0,
            history: Vec::new(),
        }
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Directives applied so far, including those read from macros.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn vis_initialized(&self) -> bool {
        self.vis.is_initialized()
    }

    pub fn apply(&mut self, directive: &str) -> Result<()> {
        let directive = directive.trim();
        if directive.is_empty() || directive.starts_with('#') {
            return Ok(());
        }
        let (command, args) = match directive.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (directive, ""),
        };

        if self.verbose >= 2 {
            tracing::info!("{}", directive);
        } else {
            tracing::debug!(directive, "apply");
        }
        self.history.push(directive.to_string());

        match command {
            "/control/macroPath" => {
                self.search_path = args
                    .split(':')
                    .filter(|d| !d.is_empty())
                    .map(PathBuf::from)
                    .collect();
            }
            "/control/execute" => {
                if args.is_empty() {
                    return Err(missing(command));
                }
                self.execute_macro(args)?;
            }
            "/control/echo" => tracing::info!("{}", args),
            "/control/verbose" => self.verbose = parse_arg(command, args)?,
            "/run/initialize" => self.run_manager.initialize()?,
            "/run/beamOn" => {
                let events = if args.is_empty() {
                    1
                } else {
                    parse_arg(command, args)?
                };
                if !self.run_manager.is_initialized() {
                    self.run_manager.initialize()?;
                }
                let summary = self.run_manager.beam_on(events)?;
                tracing::debug!(?summary, "beamOn complete");
            }
            "/run/numberOfThreads" => {
                let threads = parse_arg(command, args)?;
                self.run_manager.set_threads(threads)?;
            }
            "/random/setSeeds" => {
                let seeds = args
                    .split_whitespace()
                    .map(|s| parse_arg::<u64>(command, s))
                    .collect::<Result<Vec<_>>>()?;
                if seeds.is_empty() {
                    return Err(missing(command));
                }
                let seed = seeds
                    .iter()
                    .fold(0u64, |acc, s| acc.rotate_left(32) ^ s);
                self.run_manager.set_seed(seed);
            }
            c => match c.strip_prefix("/vis/") {
                Some(vis_command) => {
                    let geometry = self.run_manager.geometry();
                    self.vis.apply(vis_command, args, geometry.as_deref())?;
                }
                None => return Err(InterpreterError::UnknownCommand(c.to_string()).into()),
            },
        }
        Ok(())
    }

    /// Run a macro file, stopping at the first failing line.
    pub fn execute_macro(&mut self, name: &str) -> Result<()> {
        if self.depth >= MAX_MACRO_DEPTH {
            return Err(InterpreterError::TooDeep(MAX_MACRO_DEPTH).into());
        }
        let path = self.find_macro(name);
        let contents =
            std::fs::read_to_string(&path).map_err(|source| InterpreterError::MacroRead {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "executing macro");

        self.depth += 1;
        let mut result: Result<()> = Ok(());
        for (i, line) in contents.lines().enumerate() {
            if let Err(e) = self.apply(line) {
                result = Err(BootstrapError::from(InterpreterError::InMacro {
                    path: path.clone(),
                    line: i + 1,
                    source: Box::new(e),
                }));
                break;
            }
        }
        self.depth -= 1;
        result
    }

    /// The search path wins; the name as given is the fallback.
    pub fn find_macro(&self, name: &str) -> PathBuf {
        let as_given = Path::new(name);
        if as_given.is_absolute() {
            return as_given.to_path_buf();
        }
        self.search_path
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| as_given.to_path_buf())
    }
}

fn missing(command: &str) -> BootstrapError {
    BootstrapError::from(InterpreterError::BadParameter {
        command: command.to_string(),
        reason: "missing parameter".to_string(),
    })
}

fn first_arg<'s>(command: &str, args: &'s str) -> Result<&'s str> {
    args.split_whitespace().next().ok_or_else(|| missing(command))
}

fn parse_arg<T: std::str::FromStr>(command: &str, args: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let value = first_arg(command, args)?;
    value.parse::<T>().map_err(|e| {
        BootstrapError::from(InterpreterError::BadParameter {
            command: command.to_string(),
            reason: format!("'{}': {}", value, e),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunManagerKind, VisDriver};
    use crate::run_manager;
    use crate::subsystem::tests::{action, geometry, physics};
    use crate::vis::TextVisualization;
    use std::fs;

    fn assembled() -> Box<dyn RunManager> {
        let mut rm = run_manager::create(RunManagerKind::Serial, 1, 1);
        rm.register(physics()).unwrap();
        rm.register(geometry()).unwrap();
        rm.register(action()).unwrap();
        rm
    }

    fn live_vis() -> TextVisualization {
        let mut vis = TextVisualization::new(VisDriver::Quiet);
        vis.initialize().unwrap();
        vis
    }

    #[test]
    fn macro_path_splits_directories() {
        let mut rm = assembled();
        let mut vis = live_vis();
        let mut ui = CommandInterpreter::new(rm.as_mut(), &mut vis);
        ui.apply("/control/macroPath /opt/macros:./local").unwrap();
        assert_eq!(
            ui.search_path(),
            &[PathBuf::from("/opt/macros"), PathBuf::from("./local")]
        );
    }

    #[test]
    fn beam_on_initializes_on_demand() {
        let mut rm = assembled();
        let mut vis = live_vis();
        {
            let mut ui = CommandInterpreter::new(rm.as_mut(), &mut vis);
            ui.apply("/random/setSeeds 1 2").unwrap();
            ui.apply("/run/beamOn 4").unwrap();
        }
        assert!(rm.is_initialized());
    }

    #[test]
    fn unknown_and_malformed_directives_fail() {
        let mut rm = assembled();
        let mut vis = live_vis();
        let mut ui = CommandInterpreter::new(rm.as_mut(), &mut vis);
        assert!(matches!(
            ui.apply("/gun/particle gamma"),
            Err(BootstrapError::Interpreter(InterpreterError::UnknownCommand(_)))
        ));
        assert!(matches!(
            ui.apply("/run/beamOn many"),
            Err(BootstrapError::Interpreter(InterpreterError::BadParameter { .. }))
        ));
        assert!(matches!(
            ui.apply("/control/execute"),
            Err(BootstrapError::Interpreter(InterpreterError::BadParameter { .. }))
        ));
    }

    #[test]
    fn vis_directives_reach_service_with_geometry() {
        let mut rm = assembled();
        let mut vis = live_vis();
        {
            let mut ui = CommandInterpreter::new(rm.as_mut(), &mut vis);
            ui.apply("/vis/open TSG").unwrap();
            ui.apply("/vis/drawVolume").unwrap();
        }
        assert_eq!(vis.scene().viewer.as_deref(), Some("TSG"));
        assert_eq!(vis.scene().volumes.len(), 1);
    }

    #[test]
    fn macros_resolve_through_search_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("run.mac"),
            "# comment\n\n/control/verbose 2\n/run/initialize\n/run/beamOn 2\n",
        )
        .unwrap();

        let mut rm = assembled();
        let mut vis = live_vis();
        let mut ui = CommandInterpreter::new(rm.as_mut(), &mut vis);
        ui.apply(&format!("/control/macroPath {}", dir.path().display()))
            .unwrap();
        assert_eq!(ui.find_macro("run.mac"), dir.path().join("run.mac"));
        ui.apply("/control/execute run.mac").unwrap();
        assert_eq!(
            &ui.history()[1..],
            [
                "/control/execute run.mac",
                "/control/verbose 2",
                "/run/initialize",
                "/run/beamOn 2",
            ]
        );
    }

    #[test]
    fn macro_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mac");
        fs::write(&path, "/control/echo one\n/bogus\n/control/echo never\n").unwrap();

        let mut rm = assembled();
        let mut vis = live_vis();
        let mut ui = CommandInterpreter::new(rm.as_mut(), &mut vis);
        let err = ui.execute_macro(path.to_str().unwrap()).unwrap_err();
        match err {
            BootstrapError::Interpreter(InterpreterError::InMacro { line, .. }) => {
                assert_eq!(line, 2)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ui.history().iter().any(|d| d.contains("never")));
    }

    #[test]
    fn missing_macro_is_a_read_error() {
        let mut rm = assembled();
        let mut vis = live_vis();
        let mut ui = CommandInterpreter::new(rm.as_mut(), &mut vis);
        assert!(matches!(
            ui.execute_macro("definitely-not-here.mac"),
            Err(BootstrapError::Interpreter(InterpreterError::MacroRead { .. }))
        ));
    }

    #[test]
    fn recursive_macro_hits_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.mac");
        fs::write(&path, format!("/control/execute {}\n", path.display())).unwrap();

        let mut rm = assembled();
        let mut vis = live_vis();
        let mut ui = CommandInterpreter::new(rm.as_mut(), &mut vis);
        let err = ui.execute_macro(path.to_str().unwrap()).unwrap_err();

        let mut current = &err;
        loop {
            match current {
                BootstrapError::Interpreter(InterpreterError::InMacro { source, .. }) => {
                    current = &**source;
                }
                BootstrapError::Interpreter(InterpreterError::TooDeep(n)) => {
                    assert_eq!(*n, MAX_MACRO_DEPTH);
                    break;
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
