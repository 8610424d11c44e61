use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::RunManagerKind;
use crate::error::{RunError, Result};
use crate::subsystem::{
    EventAction, GeometryModel, PhysicsModel, RunSummary, Subsystem, SubsystemKind, SubsystemSet,
};

/// Execution engine owning the registered subsystems.
///
/// Both variants accept the same call sequence, so the orchestrator is written once
/// against this trait and never needs to know which one it drives.
pub trait RunManager {
    fn kind(&self) -> RunManagerKind;

    /// Transfer ownership of one subsystem; order is physics, geometry, action.
    fn register(&mut self, subsystem: Subsystem) -> Result<()>;

    fn registered(&self) -> Vec<SubsystemKind>;

    fn initialize(&mut self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Process `events` primaries and block until all of them are done.
    fn beam_on(&mut self, events: u64) -> Result<RunSummary>;

    fn set_seed(&mut self, seed: u64);

    fn set_threads(&mut self, threads: usize) -> Result<()>;

    fn geometry(&self) -> Option<Arc<dyn GeometryModel>>;

    fn abort_handle(&self) -> Arc<AbortSignal>;

    fn shutdown(&mut self);
}

pub fn create(kind: RunManagerKind, threads: usize, seed: u64) -> Box<dyn RunManager> {
    match kind {
        RunManagerKind::Parallel => Box::new(ParallelRunManager::new(threads, seed)),
        RunManagerKind::Serial => Box::new(SerialRunManager::new(seed)),
    }
}

/// Per-event seed so that every variant draws identical numbers for an event.
pub fn event_seed(seed: u64, run_id: u32, event_id: u64) -> u64 {
    seed ^ u64::from(run_id).rotate_left(32) ^ event_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Stop request for the run in progress; in-flight events still complete.
#[derive(Debug, Default)]
pub struct AbortSignal {
    requested: AtomicBool,
    running: AtomicBool,
}

impl AbortSignal {
    pub fn request(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Drops any request raised while no run was live.
    fn enter(&self) {
        self.requested.store(false, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
    }

    /// Ends the run and reports whether it was aborted.
    fn leave(&self) -> bool {
        self.running.store(false, Ordering::Relaxed);
        self.requested.swap(false, Ordering::Relaxed)
    }
}

/// State shared by both variants.
struct RunCore {
    subsystems: SubsystemSet,
    initialized: bool,
    seed: u64,
    next_run_id: u32,
    abort: Arc<AbortSignal>,
}

/// Everything a worker needs to process events of one run.
struct RunContext {
    run_id: u32,
    seed: u64,
    events: u64,
    physics: Arc<dyn PhysicsModel>,
    geometry: Arc<dyn GeometryModel>,
    action: Arc<dyn EventAction>,
    abort: Arc<AbortSignal>,
}

impl RunContext {
    fn process(&self, event_id: u64) {
        let mut rng = StdRng::seed_from_u64(event_seed(self.seed, self.run_id, event_id));
        let record = self
            .physics
            .transport(event_id, self.geometry.as_ref(), &mut rng);
        self.action.end_of_event(&record);
    }

    fn aborted(&self) -> bool {
        self.abort.is_requested()
    }
}

impl RunCore {
    fn new(seed: u64) -> Self {
        Self {
            subsystems: SubsystemSet::new(),
            initialized: false,
            seed,
            next_run_id: 0,
            abort: Arc::new(AbortSignal::default()),
        }
    }

    fn register(&mut self, subsystem: Subsystem) -> Result<()> {
        if self.initialized {
            return Err(crate::error::AssemblyError::AlreadyRegistered(subsystem.kind()).into());
        }
        let kind = subsystem.kind();
        self.subsystems.register(subsystem)?;
        tracing::debug!(%kind, "registered subsystem");
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        let registered = self.subsystems.complete()?;
        if !self.initialized {
            tracing::info!(
                physics = registered.physics.name(),
                geometry = registered.geometry.name(),
                "run manager initialized"
            );
            self.initialized = true;
        }
        Ok(())
    }

    fn begin(&mut self, events: u64) -> Result<RunContext> {
        if !self.initialized {
            return Err(RunError::NotInitialized.into());
        }
        let registered = self.subsystems.complete()?;
        let ctx = RunContext {
            run_id: self.next_run_id,
            seed: self.seed,
            events,
            physics: Arc::clone(registered.physics),
            geometry: Arc::clone(registered.geometry),
            action: Arc::clone(registered.action),
            abort: Arc::clone(&self.abort),
        };
        self.next_run_id += 1;

        tracing::info!(run_id = ctx.run_id, events, "run started");
        ctx.action.begin_of_run(ctx.run_id, events)?;
        ctx.abort.enter();
        Ok(ctx)
    }

    fn finish(&self, ctx: RunContext, processed: u64) -> Result<RunSummary> {
        let aborted = ctx.abort.leave();
        let summary = RunSummary {
            run_id: ctx.run_id,
            events_requested: ctx.events,
            events_processed: processed,
            aborted,
        };
        if aborted {
            tracing::warn!(run_id = ctx.run_id, processed, "run aborted");
        } else {
            tracing::info!(run_id = ctx.run_id, processed, "run finished");
        }
        ctx.action.end_of_run(&summary)?;
        Ok(summary)
    }
}

/// Runs every event on the calling thread.
pub struct SerialRunManager {
    core: RunCore,
}

impl SerialRunManager {
    pub fn new(seed: u64) -> Self {
        Self {
            core: RunCore::new(seed),
        }
    }
}

impl RunManager for SerialRunManager {
    fn kind(&self) -> RunManagerKind {
        RunManagerKind::Serial
    }

    fn register(&mut self, subsystem: Subsystem) -> Result<()> {
        self.core.register(subsystem)
    }

    fn registered(&self) -> Vec<SubsystemKind> {
        self.core.subsystems.registered_kinds()
    }

    fn initialize(&mut self) -> Result<()> {
        self.core.initialize()
    }

    fn is_initialized(&self) -> bool {
        self.core.initialized
    }

    fn beam_on(&mut self, events: u64) -> Result<RunSummary> {
        let ctx = self.core.begin(events)?;
        let mut processed = 0;
        for event_id in 0..events {
            if ctx.aborted() {
                break;
            }
            ctx.process(event_id);
            processed += 1;
        }
        self.core.finish(ctx, processed)
    }

    fn set_seed(&mut self, seed: u64) {
        self.core.seed = seed;
    }

    fn set_threads(&mut self, threads: usize) -> Result<()> {
        tracing::warn!(threads, "serial run manager ignores the thread count");
        Ok(())
    }

    fn geometry(&self) -> Option<Arc<dyn GeometryModel>> {
        self.core.subsystems.geometry()
    }

    fn abort_handle(&self) -> Arc<AbortSignal> {
        Arc::clone(&self.core.abort)
    }

    fn shutdown(&mut self) {
        tracing::info!(runs = self.core.next_run_id, "serial run manager shut down");
    }
}

/// Fans events out to scoped worker threads pulling ids from a shared counter.
pub struct ParallelRunManager {
    core: RunCore,
    threads: usize,
}

impl ParallelRunManager {
    pub fn new(threads: usize, seed: u64) -> Self {
        Self {
            core: RunCore::new(seed),
            threads: threads.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl RunManager for ParallelRunManager {
    fn kind(&self) -> RunManagerKind {
        RunManagerKind::Parallel
    }

    fn register(&mut self, subsystem: Subsystem) -> Result<()> {
        self.core.register(subsystem)
    }

    fn registered(&self) -> Vec<SubsystemKind> {
        self.core.subsystems.registered_kinds()
    }

    fn initialize(&mut self) -> Result<()> {
        self.core.initialize()
    }

    fn is_initialized(&self) -> bool {
        self.core.initialized
    }

    fn beam_on(&mut self, events: u64) -> Result<RunSummary> {
        let ctx = self.core.begin(events)?;
        let workers = self
            .threads()
            .min(usize::try_from(events).unwrap_or(usize::MAX))
            .max(1);
        let next = AtomicU64::new(0);
        let processed = AtomicU64::new(0);

        let joined = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let ctx = &ctx;
                    let next = &next;
                    let processed = &processed;
                    scope.spawn(move || loop {
                        if ctx.aborted() {
                            break;
                        }
                        let event_id = next.fetch_add(1, Ordering::Relaxed);
                        if event_id >= ctx.events {
                            break;
                        }
                        ctx.process(event_id);
                        processed.fetch_add(1, Ordering::Relaxed);
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join())
                .collect::<Vec<_>>()
        });

        if joined.iter().any(|r| r.is_err()) {
            ctx.abort.leave();
            return Err(RunError::WorkerPanicked.into());
        }
        tracing::debug!(workers, "event workers joined");
        self.core.finish(ctx, processed.into_inner())
    }

    fn set_seed(&mut self, seed: u64) {
        self.core.seed = seed;
    }

    fn set_threads(&mut self, threads: usize) -> Result<()> {
        if threads == 0 {
            return Err(RunError::Collaborator("thread count must be at least 1".into()).into());
        }
        self.threads = threads;
        Ok(())
    }

    fn geometry(&self) -> Option<Arc<dyn GeometryModel>> {
        self.core.subsystems.geometry()
    }

    fn abort_handle(&self) -> Arc<AbortSignal> {
        Arc::clone(&self.core.abort)
    }

    fn shutdown(&mut self) {
        tracing::info!(
            runs = self.core.next_run_id,
            threads = self.threads(),
            "parallel run manager shut down"
        );
    }
}
