use std::fmt;
use std::io::{BufRead, Write};

use crate::config::RunConfiguration;
use crate::error::{Result, VisError};
use crate::interpreter::CommandInterpreter;
use crate::session::{InteractiveSession, SessionReport};

/// Which of the two exclusive paths a run takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    Batch { macro_file: String },
    Interactive,
}

impl ExecutionMode {
    /// Decided solely by the presence of a batch macro.
    pub fn select(run: &RunConfiguration) -> Self {
        match &run.macro_path {
            Some(macro_file) => Self::Batch {
                macro_file: macro_file.clone(),
            },
            None => Self::Interactive,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Batch { macro_file } => write!(f, "batch ({})", macro_file),
            ExecutionMode::Interactive => write!(f, "interactive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Unresolved,
    Batch,
    Interactive,
    Completed,
}

#[derive(Debug)]
pub struct DispatchReport {
    pub mode: ExecutionMode,
    pub transitions: Vec<DispatchState>,
    /// Present only for interactive runs.
    pub session: Option<SessionReport>,
}

pub struct Dispatcher<'c> {
    run: &'c RunConfiguration,
    invocation: &'c [String],
    bootstrap_macro: &'c str,
    transitions: Vec<DispatchState>,
}

impl<'c> Dispatcher<'c> {
    pub fn new(
        run: &'c RunConfiguration,
        invocation: &'c [String],
        bootstrap_macro: &'c str,
    ) -> Self {
        Self {
            run,
            invocation,
            bootstrap_macro,
            transitions: vec![DispatchState::Unresolved],
        }
    }

    pub fn state(&self) -> DispatchState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(DispatchState::Unresolved)
    }

    fn enter(&mut self, state: DispatchState) {
        tracing::debug!(from = ?self.state(), to = ?state, "dispatch transition");
        self.transitions.push(state);
    }

    /// Runs exactly one path; interpreter failures propagate untouched.
    pub fn dispatch<R: BufRead, W: Write>(
        mut self,
        ui: &mut CommandInterpreter<'_>,
        input: R,
        out: W,
    ) -> Result<DispatchReport> {
        let mode = ExecutionMode::select(self.run);
        tracing::info!(%mode, "execution mode selected");

        let session = match &mode {
            ExecutionMode::Batch { macro_file } => {
                self.enter(DispatchState::Batch);
                apply_macro_directory(ui, &self.run.macro_directory)?;
                ui.apply(&format!("/control/execute {}", macro_file))?;
                None
            }
            ExecutionMode::Interactive => {
                self.enter(DispatchState::Interactive);
                if !ui.vis_initialized() {
                    return Err(VisError::NotInitialized.into());
                }
                let mut session = InteractiveSession::open(self.invocation);
                apply_macro_directory(ui, &self.run.macro_directory)?;
                ui.apply(&format!("/control/execute {}", self.bootstrap_macro))?;
                Some(session.start(input, out, ui)?)
            }
        };

        self.enter(DispatchState::Completed);
        Ok(DispatchReport {
            mode,
            transitions: self.transitions,
            session,
        })
    }
}

fn apply_macro_directory(ui: &mut CommandInterpreter<'_>, dir: &str) -> Result<()> {
    ui.apply(&format!("/control/macroPath {}", dir))?;
    tracing::debug!(search_path = ?ui.search_path(), "macro search path set");
    Ok(())
}
