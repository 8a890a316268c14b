//! Batch orchestration: one staging directory and one pipeline per input file.
//!
//! Every file runs `Staged -> HeaderFixed -> Decimated -> ZapPlanned ->
//! Dedispersed -> CandidatesParsed -> Extracted -> Done`, skipping the
//! optional stages it was not configured for. A failure stops that file at
//! the stage it reached; staged files and partial outputs stay on disk and
//! the batch moves on to the next file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::candidates::read_candidates;
use crate::config::{ExtractBackend, SearchConfig};
use crate::context::RunContext;
use crate::extract::{plan_snippets, write_plan_csv, SnippetPlan, WindowOptions};
use crate::inf::read_sampling_interval;
use crate::stage::{
    CommandRunner, DecimateRequest, DedisperseRequest, ExternalStages, HeaderFixRequest, SinglePulseRequest,
    SnippetRequest,
};
use crate::stream::{copy_range, zap_file, SpectralReader};
use crate::zap::ZapSet;
use crate::SearchError;

/// Last stage a file completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStage {
    Pending,
    Staged,
    HeaderFixed,
    Decimated,
    ZapPlanned,
    Dedispersed,
    CandidatesParsed,
    Extracted,
    Done,
}

/// Result of one file's pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub staged: Option<PathBuf>,
    pub stage: FileStage,
    pub zapped_channels: usize,
    pub candidates: usize,
    pub snippets: Vec<PathBuf>,
    pub skipped_windows: usize,
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl FileOutcome {
    fn new(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            staged: None,
            stage: FileStage::Pending,
            zapped_channels: 0,
            candidates: 0,
            snippets: Vec::new(),
            skipped_windows: 0,
            error_kind: None,
            error: None,
            elapsed_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|f| !f.succeeded()).count()
    }

    pub fn write_json(&self, path: &Path) -> Result<(), SearchError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SearchError::Config(format!("cannot serialise report: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Runs the search over every `*.fil` in a working directory.
pub struct SearchOrchestrator<R: CommandRunner> {
    config: SearchConfig,
    runner: R,
    ctx: RunContext,
}

impl<R: CommandRunner> SearchOrchestrator<R> {
    pub fn new(config: SearchConfig, runner: R, ctx: RunContext) -> Self {
        Self { config, runner, ctx }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Filterbank files directly inside `dir`, sorted by name.
    pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, SearchError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "fil") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn report_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(format!("{}_report.json", self.config.obsroot))
    }

    /// Process every input file and write the batch report.
    pub fn run(&self, workdir: &Path) -> Result<BatchReport, SearchError> {
        self.config.validate()?;
        // External tools run inside the staging directories, so every path
        // handed to them must be absolute.
        let workdir = fs::canonicalize(workdir)?;
        let workdir = workdir.as_path();
        let inputs = Self::discover(workdir)?;
        if inputs.is_empty() {
            log::warn!("[{}] no .fil files in {}", self.ctx.tag(), workdir.display());
        } else {
            log::info!("[{}] {} file(s) to search", self.ctx.tag(), inputs.len());
        }

        let mut report = BatchReport::default();
        for (i, input) in inputs.iter().enumerate() {
            report.files.push(self.process_file(workdir, i + 1, input));
        }

        let path = self.report_path(workdir);
        report.write_json(&path)?;
        log::info!(
            "[{}] {} of {} file(s) failed, report at {}",
            self.ctx.tag(),
            report.failed_count(),
            report.files.len(),
            path.display()
        );
        Ok(report)
    }

    /// Run the pipeline for one file. Never fails; errors land in the outcome.
    pub fn process_file(&self, workdir: &Path, index: usize, input: &Path) -> FileOutcome {
        let started = Instant::now();
        let name = format!("{}{index}", self.config.obsroot);
        let ctx = self.ctx.child(&name);
        let mut outcome = FileOutcome::new(input);

        match self.drive(&ctx, &workdir.join(&name), input, &mut outcome) {
            Ok(()) => {
                outcome.stage = FileStage::Done;
                log::info!(
                    "[{}] done: {} candidate(s), {} snippet(s)",
                    ctx.tag(),
                    outcome.candidates,
                    outcome.snippets.len()
                );
            }
            Err(err) => {
                log::error!("[{}] stopped after {:?}: {err}", ctx.tag(), outcome.stage);
                outcome.error_kind = Some(err.kind());
                outcome.error = Some(err.to_string());
            }
        }
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    fn drive(&self, ctx: &RunContext, dir: &Path, input: &Path, outcome: &mut FileOutcome) -> Result<(), SearchError> {
        let cfg = &self.config;
        let stages = ExternalStages::new(&self.runner, &cfg.tools);

        let (staging, fil) = stage_input(dir, input)?;
        let dir = staging.as_path();
        log::info!("[{}] staged {} in {}", ctx.tag(), input.display(), dir.display());
        outcome.staged = Some(fil.clone());
        outcome.stage = FileStage::Staged;

        if let Some(telescope) = &cfg.telescope {
            stages.fix_header(
                ctx,
                &HeaderFixRequest {
                    filterbank: fil.clone(),
                    telescope: telescope.clone(),
                    dsn: cfg.dsn,
                },
            )?;
            outcome.stage = FileStage::HeaderFixed;
        }

        let stem = file_stem(&fil)?;
        if let Some(factor) = cfg.rfi_decimation {
            let output = dir.join(format!("{stem}_avg{factor}.fil"));
            if output.exists() {
                log::info!("[{}] {} exists, not decimating again", ctx.tag(), output.display());
            } else {
                stages.decimate(
                    ctx,
                    &DecimateRequest {
                        input: fil.clone(),
                        output,
                        factor,
                        threads: cfg.threads,
                    },
                )?;
            }
            outcome.stage = FileStage::Decimated;
        }

        let reader = SpectralReader::open(&fil)?;
        let nchans = reader.header().nchans();
        if nchans != cfg.total_channels() as usize {
            return Err(SearchError::Config(format!(
                "{} has {nchans} channels but {} subbands of {} make {}",
                fil.display(),
                cfg.nsub,
                cfg.chans_per_sub,
                cfg.total_channels()
            )));
        }
        let total_samples = reader.total_samples();
        drop(reader);

        let zaps = ZapSet::plan(&cfg.zap_plan())?;
        outcome.zapped_channels = zaps.len();
        outcome.stage = FileStage::ZapPlanned;
        log::info!("[{}] {} of {nchans} channels zapped", ctx.tag(), zaps.len());

        let root = format!("{stem}_DM{:.3}", cfg.dm);
        let (dat, inf) = stages.dedisperse(
            ctx,
            &DedisperseRequest {
                filterbank: fil.clone(),
                dm: cfg.dm,
                ignore_chans: zaps.detector_arg(),
                zero_dm: cfg.zero_dm,
                out_dir: dir.to_path_buf(),
                out_root: root.clone(),
            },
        )?;
        let table = stages.search(
            ctx,
            &SinglePulseRequest {
                dat,
                threshold: cfg.snr_threshold,
                max_width_ms: cfg.max_width_ms,
                decimation: cfg.detector_decimation,
                skip_bad_blocks: cfg.skip_bad_blocks,
            },
        )?;
        outcome.stage = FileStage::Dedispersed;

        let candidates = read_candidates(&table)?;
        outcome.candidates = candidates.len();
        outcome.stage = FileStage::CandidatesParsed;
        log::info!("[{}] {} candidate(s) above S/N {}", ctx.tag(), candidates.len(), cfg.snr_threshold);

        let opts = WindowOptions {
            duration: cfg.snippet_duration,
            tsamp: read_sampling_interval(&inf)?,
            total_samples,
            policy: cfg.window_policy,
        };
        let plans = plan_snippets(ctx, &candidates, &opts, dir, &root)?;
        let csv = fs::File::create(dir.join(format!("{root}_cands.csv")))?;
        write_plan_csv(csv, &plans)?;

        for plan in &plans {
            let Some(snippet) = self.extract_one(ctx, &stages, &fil, plan)? else {
                outcome.skipped_windows += 1;
                continue;
            };
            if cfg.zap_snippets && !zaps.is_empty() {
                let zapped = snippet.with_file_name(format!("{}_zapedge.fil", file_stem(&snippet)?));
                zap_file(ctx, &snippet, &zapped, &zaps.to_spec(), cfg.block_size)?;
            }
            outcome.snippets.push(snippet);
        }
        outcome.stage = FileStage::Extracted;
        Ok(())
    }

    fn extract_one(
        &self,
        ctx: &RunContext,
        stages: &ExternalStages<'_, R>,
        fil: &Path,
        plan: &SnippetPlan,
    ) -> Result<Option<PathBuf>, SearchError> {
        let Some((start, length)) = plan.placement.span() else {
            return Ok(None);
        };
        let path = match self.config.extract_backend {
            ExtractBackend::External => stages.extract(
                ctx,
                &SnippetRequest {
                    source: fil.to_path_buf(),
                    start,
                    length,
                    output: plan.output.clone(),
                },
            )?,
            ExtractBackend::Native => {
                copy_range(ctx, fil, &plan.output, start, length, self.config.block_size)?;
                plan.output.clone()
            }
        };
        Ok(Some(path))
    }
}

/// Move `input` into `dir`, creating it if needed.
///
/// Returns the absolute staging directory and staged file path.
fn stage_input(dir: &Path, input: &Path) -> Result<(PathBuf, PathBuf), SearchError> {
    let name = input
        .file_name()
        .ok_or_else(|| SearchError::Config(format!("{} has no file name", input.display())))?;
    fs::create_dir_all(dir)?;
    let dir = fs::canonicalize(dir)?;
    let dest = dir.join(name);
    if fs::rename(input, &dest).is_err() {
        fs::copy(input, &dest)?;
        fs::remove_file(input)?;
    }
    Ok((dir, dest))
}

fn file_stem(path: &Path) -> Result<String, SearchError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| SearchError::Config(format!("{} has no usable file stem", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(FileStage::Staged < FileStage::HeaderFixed);
        assert!(FileStage::Dedispersed < FileStage::Done);
    }

    #[test]
    fn discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.fil", "a.fil", "notes.txt", "c.fil.bak"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.fil")).unwrap();
        let found = SearchOrchestrator::<crate::stage::ProcessRunner>::discover(dir.path()).unwrap();
        let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, ["a.fil", "b.fil"]);
    }

    #[test]
    fn report_counts_failures() {
        let mut bad = FileOutcome::new(Path::new("x.fil"));
        bad.error = Some("boom".into());
        let report = BatchReport {
            files: vec![FileOutcome::new(Path::new("y.fil")), bad],
        };
        assert_eq!(report.failed_count(), 1);
    }
}
