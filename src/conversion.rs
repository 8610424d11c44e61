//! Photon conversion collaborators wired in by the binary.
//!
//! A photon beam hits a single slab; the conversion depth follows an exponential
//! with mean free path 9/7 X0. The recorder writes one line per event to the
//! output artifact when the run ends.

use rand::RngCore;
use rand_distr::{Distribution, Exp};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::assembler::SubsystemFactory;
use crate::config::AppConfig;
use crate::error::{Result, RunError};
use crate::subsystem::{EventAction, EventRecord, GeometryModel, PhysicsModel, RunSummary};

/// e+e- pair production threshold, 2 m_e c^2.
pub const PAIR_THRESHOLD_MEV: f64 = 1.022;

pub struct SlabDetector {
    material: String,
    thickness_cm: f64,
    radiation_length_cm: f64,
}

impl SlabDetector {
    pub fn new(material: impl Into<String>, thickness_cm: f64, radiation_length_cm: f64) -> Self {
        Self {
            material: material.into(),
            thickness_cm,
            radiation_length_cm,
        }
    }
}

impl GeometryModel for SlabDetector {
    fn name(&self) -> &str {
        &self.material
    }

    fn thickness_cm(&self) -> f64 {
        self.thickness_cm
    }

    fn radiation_length_cm(&self) -> f64 {
        self.radiation_length_cm
    }
}

pub struct ConversionPhysics {
    photon_energy_mev: f64,
}

impl ConversionPhysics {
    pub fn new(photon_energy_mev: f64) -> Self {
        Self { photon_energy_mev }
    }

    pub fn mean_free_path_cm(radiation_length_cm: f64) -> f64 {
        9.0 / 7.0 * radiation_length_cm
    }
}

impl PhysicsModel for ConversionPhysics {
    fn name(&self) -> &str {
        "pair-conversion"
    }

    fn transport(
        &self,
        event_id: u64,
        geometry: &dyn GeometryModel,
        rng: &mut dyn RngCore,
    ) -> EventRecord {
        let thickness = geometry.thickness_cm();
        let escaped = EventRecord {
            event_id,
            converted: false,
            depth_cm: thickness,
        };
        if self.photon_energy_mev < PAIR_THRESHOLD_MEV {
            return escaped;
        }

        let rate = 1.0 / Self::mean_free_path_cm(geometry.radiation_length_cm());
        let Ok(dist) = Exp::new(rate) else {
            return escaped;
        };
        let depth: f64 = dist.sample(rng);
        if depth < thickness {
            EventRecord {
                event_id,
                converted: true,
                depth_cm: depth,
            }
        } else {
            escaped
        }
    }
}

/// Collects event records and writes one block per run to the output artifact.
///
/// The artifact is truncated by the first run of the recorder; later runs append.
pub struct ConversionRecorder {
    geometry: Arc<dyn GeometryModel>,
    output: PathBuf,
    records: Mutex<Vec<EventRecord>>,
    truncated: AtomicBool,
}

impl ConversionRecorder {
    pub fn new(geometry: Arc<dyn GeometryModel>, output: impl Into<PathBuf>) -> Self {
        Self {
            geometry,
            output: output.into(),
            records: Mutex::new(Vec::new()),
            truncated: AtomicBool::new(false),
        }
    }

    fn write(&self, summary: &RunSummary, records: &[EventRecord]) -> std::io::Result<()> {
        let append = self.truncated.load(Ordering::Relaxed);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(&self.output)?;
        self.truncated.store(true, Ordering::Relaxed);
        let mut out = BufWriter::new(file);
        writeln!(
            out,
            "# run={} material={} thickness_cm={} events={} aborted={}",
            summary.run_id,
            self.geometry.name(),
            self.geometry.thickness_cm(),
            summary.events_processed,
            summary.aborted
        )?;
        writeln!(out, "event_id,converted,depth_cm")?;
        for r in records {
            writeln!(out, "{},{},{:.6}", r.event_id, u8::from(r.converted), r.depth_cm)?;
        }
        out.flush()
    }
}

impl EventAction for ConversionRecorder {
    fn begin_of_run(&self, _run_id: u32, events: u64) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| RunError::Collaborator("event record store poisoned".into()))?;
        records.clear();
        records.reserve(usize::try_from(events).unwrap_or(0).min(1 << 20));
        Ok(())
    }

    fn end_of_event(&self, record: &EventRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }

    fn end_of_run(&self, summary: &RunSummary) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| RunError::Collaborator("event record store poisoned".into()))?;
        records.sort_by_key(|r| r.event_id);

        let converted = records.iter().filter(|r| r.converted).count();
        tracing::info!(
            run_id = summary.run_id,
            converted,
            events = records.len(),
            output = %self.output.display(),
            "writing conversion results"
        );

        self.write(summary, &records).map_err(|source| RunError::Output {
            path: self.output.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Builds the conversion collaborators from the resolved configuration.
pub struct ConversionFactory {
    material: String,
    thickness_cm: f64,
    radiation_length_cm: f64,
    photon_energy_mev: f64,
}

impl ConversionFactory {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            material: cfg.detector.material.clone(),
            thickness_cm: cfg.detector.thickness_cm,
            radiation_length_cm: cfg.detector.radiation_length_cm,
            photon_energy_mev: cfg.beam.photon_energy_mev,
        }
    }
}

impl SubsystemFactory for ConversionFactory {
    fn physics(&self) -> Result<Arc<dyn PhysicsModel>> {
        Ok(Arc::new(ConversionPhysics::new(self.photon_energy_mev)))
    }

    fn geometry(&self) -> Result<Arc<dyn GeometryModel>> {
        Ok(Arc::new(SlabDetector::new(
            self.material.clone(),
            self.thickness_cm,
            self.radiation_length_cm,
        )))
    }

    fn action(
        &self,
        geometry: Arc<dyn GeometryModel>,
        output_artifact_name: &str,
    ) -> Result<Arc<dyn EventAction>> {
        Ok(Arc::new(ConversionRecorder::new(
            geometry,
            output_artifact_name,
        )))
    }
}
