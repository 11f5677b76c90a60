use std::fs;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::command::{PipelineScripts, RunOptions, compile_command};
use crate::config::{BuildoutConfig, PartOptions, RunContext};
use crate::deps::{self, LinkedTool};
use crate::error::PrepError;
use crate::layout::Layout;
use crate::materialize::{InstallationState, Materialization, Materializer};
use crate::quick;
use crate::reads::{stage_reads, write_read_list};
use crate::shebang::patch_perl_scripts;
use crate::validate::validate_pairing;

#[derive(Debug, Clone, Serialize)]
pub struct PartReport {
    pub part: String,
    pub accession: String,
    pub experiment_id: String,
    pub run_dir: Utf8PathBuf,
    pub quick: bool,
    pub bin: Materialization,
    pub lib: Materialization,
    pub results: Materialization,
    pub gem_indices: Materialization,
    pub staged: Vec<Utf8PathBuf>,
    pub skipped: Vec<String>,
    pub dependencies: Vec<LinkedTool>,
    pub scripts: Vec<Utf8PathBuf>,
    pub read_entries: usize,
    pub prepared_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PrepareOutcome {
    Prepared(PartReport),
    Skipped { part: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Prepares parts one after another, sharing one installation state.
pub struct App {
    config: BuildoutConfig,
    workdir: Utf8PathBuf,
    state: InstallationState,
}

impl App {
    pub fn new(config: BuildoutConfig, workdir: Utf8PathBuf) -> Self {
        Self {
            config,
            workdir,
            state: InstallationState::new(),
        }
    }

    pub fn state(&self) -> &InstallationState {
        &self.state
    }

    pub fn prepare_all(
        &mut self,
        parts_root: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<PrepareOutcome>, PrepError> {
        let parts = self.config.parts(parts_root);
        let mut outcomes = Vec::with_capacity(parts.len());
        for part in parts {
            outcomes.push(self.prepare(&part, sink)?);
        }
        Ok(outcomes)
    }

    /// Prepares one part, falling back to quick mode for unknown accessions.
    pub fn prepare(
        &mut self,
        part: &PartOptions,
        sink: &dyn ProgressSink,
    ) -> Result<PrepareOutcome, PrepError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; part {}", part.name),
            elapsed: None,
        });
        let (context, quick) = match RunContext::resolve(&self.config, part) {
            Ok(context) => (context, false),
            Err(PrepError::MissingAccession(accession)) => {
                if !quick::is_applicable(&self.config, part) {
                    warn!(part = %part.name, %accession, "accession not found, skipping part");
                    return Ok(PrepareOutcome::Skipped {
                        part: part.name.clone(),
                        reason: format!("accession not found: {accession}"),
                    });
                }
                info!(part = %part.name, workdir = %self.workdir, "accession not found, using quick mode");
                (quick::quick_context(&self.config, part, &self.workdir)?, true)
            }
            Err(err) => return Err(err),
        };
        self.prepare_context(&context, quick, sink)
            .map(PrepareOutcome::Prepared)
    }

    pub fn prepare_context(
        &mut self,
        context: &RunContext,
        quick: bool,
        sink: &dyn ProgressSink,
    ) -> Result<PartReport, PrepError> {
        let started = Instant::now();
        let phase = |message: String| {
            sink.event(ProgressEvent {
                message,
                elapsed: Some(started.elapsed()),
            })
        };

        let experiment_id = context.experiment_id();
        let run_dir = context.part.location.clone();
        let layout = Layout::new(context.directory.clone());
        let accession = &context.accession;
        fs::create_dir_all(run_dir.as_std_path()).map_err(|err| PrepError::fs(&run_dir, err))?;
        info!(part = %context.part.name, %experiment_id, run_dir = %run_dir, "preparing part");

        let bin_dir = layout.shared_bin_dir();
        let lib_dir = layout.shared_lib_dir();
        let mut materializer = Materializer::new(&mut self.state);
        let bin = materializer.ensure_materialized(&bin_dir, &run_dir.join("bin"), |path| {
            Layout::copy_dir_recursive(&layout.pipeline_bin_source(), path)?;
            let patched = patch_perl_scripts(path, context.settings.require("perl")?)?;
            info!(scripts = patched.len(), "patched perl interpreter lines");
            Ok(())
        })?;
        let lib = materializer.ensure_materialized(&lib_dir, &run_dir.join("lib"), |path| {
            Layout::copy_dir_recursive(&layout.pipeline_lib_source(), path)
        })?;
        let results = materializer.ensure_directory(
            &layout.results_dir(&experiment_id),
            &run_dir.join("results"),
        )?;
        let gem_indices =
            materializer.ensure_directory(&layout.gem_indices_dir(), &run_dir.join("GEMIndices"))?;
        phase(format!("phase=Materialize; bin {bin:?}, lib {lib:?}"));

        let staged = stage_reads(&run_dir, &accession.file_locations())?;
        phase(format!(
            "phase=Stage; {} read files linked, {} missing",
            staged.linked.len(),
            staged.skipped.len()
        ));

        let dependencies = if bin == Materialization::Populated {
            let linked =
                deps::link_dependencies(&deps::catalogue(), &layout, &context.settings, &bin_dir)?;
            phase(format!("phase=Dependencies; {} binaries linked", linked.len()));
            linked
        } else {
            Vec::new()
        };

        let command = compile_command(
            accession,
            &context.pipeline,
            &RunOptions::from_part(&context.part),
            &layout,
        )?;
        let scripts = PipelineScripts::from_command(&command).write(&run_dir)?;
        phase("phase=Scripts; start, clean and execute written".to_string());

        validate_pairing(accession, &experiment_id)?;
        let entries = write_read_list(&run_dir, accession)?;
        phase(format!("phase=ReadList; {} entries", entries.len()));
        materializer.finish();

        info!(part = %context.part.name, elapsed = ?started.elapsed(), "part prepared");
        Ok(PartReport {
            part: context.part.name.clone(),
            accession: accession.name.clone(),
            experiment_id,
            run_dir,
            quick,
            bin,
            lib,
            results,
            gem_indices,
            staged: staged.linked,
            skipped: staged.skipped,
            dependencies,
            scripts,
            read_entries: entries.len(),
            prepared_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}
