use std::io::{BufRead, Write};

use crate::error::Result;
use crate::interpreter::CommandInterpreter;

pub const PROMPT: &str = "Idle> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed `exit`.
    Exit,
    EndOfInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub directives: usize,
    pub failures: usize,
}

/// User-driven command loop; blocks until `exit` or end of input.
pub struct InteractiveSession {
    args: Vec<String>,
}

impl InteractiveSession {
    pub fn open(args: &[String]) -> Self {
        tracing::info!(args = ?args, "interactive session opened");
        Self {
            args: args.to_vec(),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn start<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        mut out: W,
        ui: &mut CommandInterpreter<'_>,
    ) -> Result<SessionReport> {
        writeln!(out, "Type 'help' for the directive list, 'exit' to end the session.")?;
        let mut report = SessionReport {
            end: SessionEnd::EndOfInput,
            directives: 0,
            failures: 0,
        };
        let mut line = String::new();

        loop {
            write!(out, "{}", PROMPT)?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                break;
            }

            match line.trim() {
                "" => continue,
                "exit" => {
                    report.end = SessionEnd::Exit;
                    break;
                }
                "help" => print_help(&mut out)?,
                "history" => {
                    for (i, d) in ui.history().iter().enumerate() {
                        writeln!(out, "{:4}  {}", i, d)?;
                    }
                }
                directive => {
                    report.directives += 1;
                    // A typo must not end the session.
                    if let Err(e) = ui.apply(directive) {
                        report.failures += 1;
                        tracing::warn!(directive, error = %e, "directive failed");
                        writeln!(out, "ERROR: {}", e)?;
                    }
                }
            }
        }

        tracing::info!(
            args = ?self.args(),
            end = ?report.end,
            directives = report.directives,
            failures = report.failures,
            "interactive session closed"
        );
        Ok(report)
    }
}

fn print_help<W: Write>(out: &mut W) -> std::io::Result<()> {
    const DIRECTIVES: [&str; 10] = [
        "/control/macroPath <dir[:dir...]>",
        "/control/execute <macro>",
        "/control/echo <text>",
        "/control/verbose <level>",
        "/run/initialize",
        "/run/beamOn <events>",
        "/run/numberOfThreads <n>",
        "/random/setSeeds <n> [n...]",
        "/vis/<command> [args]",
        "history | exit",
    ];
    for d in DIRECTIVES {
        writeln!(out, "  {}", d)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunManagerKind, VisDriver};
    use crate::run_manager::{self, RunManager};
    use crate::subsystem::tests::{action, geometry, physics};
    use crate::vis::{TextVisualization, VisualizationService};
    use std::io::Cursor;

    fn assembled() -> Box<dyn RunManager> {
        let mut rm = run_manager::create(RunManagerKind::Serial, 1, 1);
        rm.register(physics()).unwrap();
        rm.register(geometry()).unwrap();
        rm.register(action()).unwrap();
        rm
    }

    fn run_session(script: &str) -> (SessionReport, String, Vec<String>) {
        let mut rm = assembled();
        let mut vis = TextVisualization::new(VisDriver::Quiet);
        vis.initialize().unwrap();
        let mut ui = CommandInterpreter::new(rm.as_mut(), &mut vis);

        let mut out = Vec::new();
        let mut session = InteractiveSession::open(&["run42.root".to_string()]);
        assert_eq!(session.args(), ["run42.root".to_string()]);
        let report = session
            .start(Cursor::new(script.to_string()), &mut out, &mut ui)
            .unwrap();
        let history = ui.history().to_vec();
        (report, String::from_utf8(out).unwrap(), history)
    }

    #[test]
    fn exit_closes_session_and_skips_remaining_input() {
        let (report, _, history) = run_session("/run/beamOn 2\nexit\n/run/beamOn 5\n");
        assert_eq!(report.end, SessionEnd::Exit);
        assert_eq!(report.directives, 1);
        assert_eq!(history, vec!["/run/beamOn 2".to_string()]);
    }

    #[test]
    fn end_of_input_closes_session() {
        let (report, output, _) = run_session("/control/echo hi\n");
        assert_eq!(report.end, SessionEnd::EndOfInput);
        assert_eq!(output.matches(PROMPT).count(), 2);
    }

    #[test]
    fn failing_directive_is_reported_and_loop_continues() {
        let (report, output, history) = run_session("/nope\n\n/run/beamOn 1\nexit\n");
        assert_eq!(report.failures, 1);
        assert_eq!(report.directives, 2);
        assert!(output.contains("ERROR: command error: command not found: /nope"));
        assert_eq!(history.last().map(String::as_str), Some("/run/beamOn 1"));
    }

    #[test]
    fn help_lists_directives() {
        let (_, output, history) = run_session("help\nexit\n");
        assert!(output.contains("/run/beamOn <events>"));
        assert!(history.is_empty());
    }
}
