use std::io::{self, BufRead, Write};

use crate::assembler::{self, SubsystemFactory};
use crate::config::{AppConfig, RunConfiguration};
use crate::conversion::ConversionFactory;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::Result;
use crate::interpreter::CommandInterpreter;
use crate::run_manager::{self, RunManager};
use crate::vis::{self, VisualizationService};

/// Owns the assembled run for the lifetime of the process.
pub struct Bootstrap {
    // Declaration order is drop order: visualization goes before the run manager.
    vis: Box<dyn VisualizationService>,
    run_manager: Box<dyn RunManager>,
    run: RunConfiguration,
    invocation: Vec<String>,
    bootstrap_macro: String,
}

impl Bootstrap {
    /// Assemble subsystems, then bring up visualization. Any failure is fatal.
    pub fn new(
        cfg: &AppConfig,
        mut run_manager: Box<dyn RunManager>,
        mut vis: Box<dyn VisualizationService>,
        factory: &dyn SubsystemFactory,
    ) -> Result<Self> {
        assembler::assemble(&cfg.run, factory, run_manager.as_mut())?;
        vis.initialize()?;

        Ok(Self {
            vis,
            run_manager,
            run: cfg.run.clone(),
            invocation: cfg.invocation.clone(),
            bootstrap_macro: cfg.bootstrap_macro.clone(),
        })
    }

    pub fn run_manager(&self) -> &dyn RunManager {
        self.run_manager.as_ref()
    }

    pub fn dispatch<R: BufRead, W: Write>(&mut self, input: R, out: W) -> Result<DispatchReport> {
        let mut ui = CommandInterpreter::new(self.run_manager.as_mut(), self.vis.as_mut());
        Dispatcher::new(&self.run, &self.invocation, &self.bootstrap_macro)
            .dispatch(&mut ui, input, out)
    }

    /// Release visualization, then the run manager and the subsystems it owns.
    pub fn teardown(self) {
        let Self {
            mut vis,
            mut run_manager,
            ..
        } = self;

        vis.shutdown();
        drop(vis);

        run_manager.shutdown();
        drop(run_manager);
        tracing::debug!("teardown complete");
    }
}

/// Build everything from `cfg`, dispatch on stdin/stdout and tear down.
pub fn run(cfg: &AppConfig) -> Result<DispatchReport> {
    let run_manager = run_manager::create(cfg.manager, cfg.threads, cfg.seed);
    let factory = ConversionFactory::from_config(cfg);
    let visualization = vis::create(cfg.vis_driver);
    let mut bootstrap = Bootstrap::new(cfg, run_manager, visualization, &factory)?;
    tracing::info!(
        manager = %bootstrap.run_manager().kind(),
        threads = cfg.threads,
        seed = cfg.seed,
        "run manager ready"
    );

    let abort = bootstrap.run_manager().abort_handle();
    let installed = ctrlc::set_handler(move || {
        if abort.is_running() {
            eprintln!("\nabort requested; finishing in-flight events");
            abort.request();
        } else {
            std::process::exit(130);
        }
    });
    if let Err(e) = installed {
        tracing::warn!(error = %e, "could not install Ctrl-C handler; runs cannot be aborted");
    }

    let stdin = io::stdin();
    let outcome = bootstrap.dispatch(stdin.lock(), io::stdout());
    bootstrap.teardown();
    outcome
}
