use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

use crate::subsystem::SubsystemKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("config value '{0}' must not be empty")]
    Empty(&'static str),

    #[error("invalid config value '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("{got} registered out of order, expected {expected}")]
    OutOfOrder {
        expected: SubsystemKind,
        got: SubsystemKind,
    },

    #[error("{0} is already registered")]
    AlreadyRegistered(SubsystemKind),

    #[error("run manager is missing the {0} subsystem")]
    Incomplete(SubsystemKind),
}

#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("command not found: {0}")]
    UnknownCommand(String),

    #[error("bad parameter for {command}: {reason}")]
    BadParameter { command: String, reason: String },

    #[error("macro file {} could not be read: {source}", .path.display())]
    MacroRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}:{line}: {source}", .path.display())]
    InMacro {
        path: PathBuf,
        line: usize,
        source: Box<BootstrapError>,
    },

    #[error("macro nesting deeper than {0} levels")]
    TooDeep(usize),
}

#[derive(Debug, Error)]
pub enum VisError {
    #[error("visualization service is not initialized")]
    NotInitialized,

    #[error("visualization command failed: {0}")]
    Command(String),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run manager is not initialized")]
    NotInitialized,

    #[error("event worker panicked")]
    WorkerPanicked,

    #[error("failed to write output {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Collaborator(String),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("run error: {0}")]
    Run(#[from] RunError),

    #[error("command error: {0}")]
    Interpreter(#[from] InterpreterError),

    #[error("visualization error: {0}")]
    Vis(#[from] VisError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    /// Process exit status for this failure.
    ///
    /// `2` configuration, `3` assembly order, `1` everything raised by a
    /// collaborator while the run was live.
    pub fn exit_status(&self) -> u8 {
        match self {
            BootstrapError::Config(_) => 2,
            BootstrapError::Assembly(_) => 3,
            BootstrapError::Run(_)
            | BootstrapError::Interpreter(_)
            | BootstrapError::Vis(_)
            | BootstrapError::Io(_) => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_follows_taxonomy() {
        let cfg: BootstrapError = ConfigError::Empty("out_filename").into();
        assert_eq!(cfg.exit_status(), 2);

        let asm: BootstrapError = AssemblyError::Incomplete(SubsystemKind::Physics).into();
        assert_eq!(asm.exit_status(), 3);

        let cmd: BootstrapError = InterpreterError::UnknownCommand("/foo".into()).into();
        assert_eq!(cmd.exit_status(), 1);

        let vis: BootstrapError = VisError::NotInitialized.into();
        assert_eq!(vis.exit_status(), 1);
    }

    #[test]
    fn macro_errors_name_file_and_line() {
        let inner: BootstrapError = InterpreterError::UnknownCommand("/bogus".into()).into();
        let err = InterpreterError::InMacro {
            path: PathBuf::from("macros/run.mac"),
            line: 3,
            source: Box::new(inner),
        };
        assert_eq!(
            err.to_string(),
            "macros/run.mac:3: command error: command not found: /bogus"
        );
    }
}
