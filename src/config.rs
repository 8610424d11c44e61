use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// File looked up in the working directory when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "particleconversion.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunManagerKind {
    Parallel,
    Serial,
}

impl Default for RunManagerKind {
    fn default() -> Self {
        if cfg!(feature = "multithreaded") {
            Self::Parallel
        } else {
            Self::Serial
        }
    }
}

impl fmt::Display for RunManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunManagerKind::Parallel => write!(f, "parallel"),
            RunManagerKind::Serial => write!(f, "serial"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisDriver {
    Text,
    Quiet,
}

impl Default for VisDriver {
    fn default() -> Self {
        Self::Text
    }
}

impl fmt::Display for VisDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisDriver::Text => write!(f, "text"),
            VisDriver::Quiet => write!(f, "quiet"),
        }
    }
}

/// Bootstrap for the photon conversion Monte-Carlo run.
#[derive(Debug, Parser)]
#[command(name = "particleconv")]
#[command(about = "Assemble the conversion simulation and run a macro or an interactive session")]
pub struct Cli {
    /// `[OUTPUT [MACRO_DIR]]`; any other count falls back to the configured defaults
    #[arg(value_name = "ARGS")]
    pub args: Vec<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE", env = "PARTICLECONV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub particleconversion: ParticleConversionConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub vis: VisConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub beam: BeamConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ParticleConversionConfig {
    pub out_filename: String,
    pub macro_folder: String,
    pub macro_path: Option<String>,
}

impl Default for ParticleConversionConfig {
    fn default() -> Self {
        Self {
            out_filename: "particleconversion.root".to_string(),
            macro_folder: "macros".to_string(),
            macro_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub manager: RunManagerKind,
    pub threads: usize,
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            manager: RunManagerKind::default(),
            threads: std::thread::available_parallelism().map_or(2, |n| n.get()),
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VisConfig {
    pub driver: VisDriver,
    pub bootstrap_macro: String,
}

impl Default for VisConfig {
    fn default() -> Self {
        Self {
            driver: VisDriver::Text,
            bootstrap_macro: "vis.mac".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub material: String,
    pub thickness_cm: f64,
    pub radiation_length_cm: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            material: "G4_Pb".to_string(),
            thickness_cm: 0.5,
            radiation_length_cm: 0.5612,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BeamConfig {
    pub photon_energy_mev: f64,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            photon_energy_mev: 10.0,
        }
    }
}

/// Where the output name and macro directory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentSource {
    Defaults,
    OutputOnly,
    OutputAndMacroDir,
    /// More than two arguments: ignored, defaults used.
    Ignored(usize),
}

/// Values the orchestrator needs to assemble and dispatch a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    pub output_artifact_name: String,
    pub macro_directory: String,
    pub macro_path: Option<String>,
}

impl RunConfiguration {
    /// Apply the invocation arguments on top of validated defaults.
    pub fn from_invocation(
        args: &[String],
        defaults: &ParticleConversionConfig,
    ) -> (Self, ArgumentSource) {
        let (output, macro_dir, source) = match args {
            [output] => (
                output.clone(),
                defaults.macro_folder.clone(),
                ArgumentSource::OutputOnly,
            ),
            [output, dir] => (output.clone(), dir.clone(), ArgumentSource::OutputAndMacroDir),
            _ => (
                defaults.out_filename.clone(),
                defaults.macro_folder.clone(),
                if args.is_empty() {
                    ArgumentSource::Defaults
                } else {
                    ArgumentSource::Ignored(args.len())
                },
            ),
        };

        let macro_path = defaults
            .macro_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        (
            Self {
                output_artifact_name: output,
                macro_directory: macro_dir,
                macro_path,
            },
            source,
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.output_artifact_name.trim().is_empty() {
            return Err(ConfigError::Empty("output artifact name"));
        }
        if self.macro_directory.trim().is_empty() {
            return Err(ConfigError::Empty("macro directory"));
        }
        Ok(())
    }
}

/// Resolved configuration after merging the TOML file with the command line.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    pub invocation: Vec<String>,
    pub run: RunConfiguration,
    pub manager: RunManagerKind,
    pub threads: usize,
    pub seed: u64,
    pub vis_driver: VisDriver,
    pub bootstrap_macro: String,
    pub detector: DetectorConfig,
    pub beam: BeamConfig,
}

impl AppConfig {
    /// Build the final config: built-in defaults -> file values -> positional arguments.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let path = locate_config(cli.config.as_deref(), Path::new(DEFAULT_CONFIG_FILE));
        let file_cfg = match &path {
            Some(p) => load_file_config(p)?,
            None => FileConfig::default(),
        };
        Self::from_parts(file_cfg, &cli.args, path)
    }

    pub fn from_parts(
        file_cfg: FileConfig,
        args: &[String],
        config_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let defaults = &file_cfg.particleconversion;
        if defaults.out_filename.trim().is_empty() {
            return Err(ConfigError::Empty("particleconversion.out_filename"));
        }
        if defaults.macro_folder.trim().is_empty() {
            return Err(ConfigError::Empty("particleconversion.macro_folder"));
        }

        let (run, source) = RunConfiguration::from_invocation(args, defaults);
        run.validate()?;
        announce(&run, source, args);

        if file_cfg.run.threads == 0 {
            return Err(ConfigError::Invalid {
                key: "run.threads",
                reason: "must be at least 1".to_string(),
            });
        }
        check_length("detector.thickness_cm", file_cfg.detector.thickness_cm)?;
        check_length(
            "detector.radiation_length_cm",
            file_cfg.detector.radiation_length_cm,
        )?;
        if !file_cfg.beam.photon_energy_mev.is_finite() || file_cfg.beam.photon_energy_mev < 0.0 {
            return Err(ConfigError::Invalid {
                key: "beam.photon_energy_mev",
                reason: format!("{} is not a valid energy", file_cfg.beam.photon_energy_mev),
            });
        }
        if file_cfg.vis.bootstrap_macro.trim().is_empty() {
            return Err(ConfigError::Empty("vis.bootstrap_macro"));
        }

        let seed = file_cfg.run.seed.unwrap_or_else(rand::random);

        Ok(Self {
            config_path,
            invocation: args.to_vec(),
            run,
            manager: file_cfg.run.manager,
            threads: file_cfg.run.threads,
            seed,
            vis_driver: file_cfg.vis.driver,
            bootstrap_macro: file_cfg.vis.bootstrap_macro,
            detector: file_cfg.detector,
            beam: file_cfg.beam,
        })
    }
}

/// An explicit path always wins; otherwise the default file is used only if it exists.
pub fn locate_config(explicit: Option<&Path>, fallback: &Path) -> Option<PathBuf> {
    match explicit {
        Some(p) => Some(p.to_path_buf()),
        None if fallback.is_file() => Some(fallback.to_path_buf()),
        None => None,
    }
}

pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<FileConfig>(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn check_length(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("{} is not a positive length", value),
        })
    }
}

fn announce(run: &RunConfiguration, source: ArgumentSource, args: &[String]) {
    match source {
        ArgumentSource::Defaults => tracing::info!(
            output = %run.output_artifact_name,
            macro_dir = %run.macro_directory,
            "using configured defaults"
        ),
        ArgumentSource::OutputOnly => tracing::info!(
            output = %run.output_artifact_name,
            "using command line parameter as out file"
        ),
        ArgumentSource::OutputAndMacroDir => tracing::info!(
            output = %run.output_artifact_name,
            macro_dir = %run.macro_directory,
            "using command line parameters as out file and macro directory"
        ),
        ArgumentSource::Ignored(count) => tracing::warn!(
            count,
            ignored = ?args,
            output = %run.output_artifact_name,
            macro_dir = %run.macro_directory,
            "expected at most 2 arguments; falling back to configured defaults"
        ),
    }
    if let Some(macro_path) = &run.macro_path {
        tracing::info!(macro_path = %macro_path, "batch macro configured");
    }
}
