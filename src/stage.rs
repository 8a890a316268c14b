//! Typed requests to the external programs the pipeline drives.
//!
//! Each request renders to a [`StageCommand`]; a [`CommandRunner`] executes
//! it and [`ExternalStages`] checks the exit status and the files the tool
//! is expected to leave behind.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::{ToolPaths, ToolSpec};
use crate::context::RunContext;
use crate::SearchError;

/// A fully rendered external invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCommand {
    /// Short label used in logs and errors.
    pub tool: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Redirect stdout into this file instead of capturing it.
    pub stdout_to: Option<PathBuf>,
}

impl StageCommand {
    fn new(tool: &'static str, spec: &ToolSpec) -> Self {
        Self {
            tool,
            program: spec.program.clone(),
            args: spec.args.clone(),
            cwd: None,
            stdout_to: None,
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn path_arg(self, path: &Path) -> Self {
        let s = path.to_string_lossy().into_owned();
        self.arg(s)
    }

    fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        if let Some(out) = &self.stdout_to {
            write!(f, " > {}", out.display())?;
        }
        Ok(())
    }
}

/// Exit status plus captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Executes external commands. Blocks until the command exits.
pub trait CommandRunner {
    fn run(&self, cmd: &StageCommand) -> io::Result<StageOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, cmd: &StageCommand) -> io::Result<StageOutput> {
        (**self).run(cmd)
    }
}

/// Runs commands as child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, cmd: &StageCommand) -> io::Result<StageOutput> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args).stdin(Stdio::null());
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }
        if let Some(path) = &cmd.stdout_to {
            command.stdout(Stdio::from(File::create(path)?));
        }
        let output = command.output()?;
        Ok(StageOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Rewrite the telescope fields of a filterbank file in place.
#[derive(Debug, Clone)]
pub struct HeaderFixRequest {
    pub filterbank: PathBuf,
    pub telescope: String,
    pub dsn: bool,
}

impl HeaderFixRequest {
    pub fn command(&self, tools: &ToolPaths) -> StageCommand {
        let cmd = StageCommand::new("header-fix", &tools.header_fix)
            .arg("--filterbank")
            .path_arg(&self.filterbank)
            .arg("--telescope")
            .arg(self.telescope.clone());
        if self.dsn {
            cmd.arg("--dsn")
        } else {
            cmd
        }
    }
}

/// Time-decimate a filterbank file to 32-bit floats.
#[derive(Debug, Clone)]
pub struct DecimateRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub factor: u32,
    pub threads: u32,
}

impl DecimateRequest {
    pub fn command(&self, tools: &ToolPaths) -> StageCommand {
        StageCommand::new("channelizer", &tools.channelizer)
            .arg("-I0")
            .arg("-b-32")
            .arg("-t")
            .arg(self.factor.to_string())
            .arg("-threads")
            .arg(self.threads.to_string())
            .arg("-o")
            .path_arg(&self.output)
            .path_arg(&self.input)
    }
}

/// Incoherently dedisperse a filterbank file into `<out_root>.dat/.inf`.
#[derive(Debug, Clone)]
pub struct DedisperseRequest {
    pub filterbank: PathBuf,
    pub dm: f64,
    /// Bottom-first channel list; `None` omits the exclusion flag.
    pub ignore_chans: Option<String>,
    pub zero_dm: bool,
    pub out_dir: PathBuf,
    pub out_root: String,
}

impl DedisperseRequest {
    pub fn command(&self, tools: &ToolPaths) -> StageCommand {
        let mut cmd = StageCommand::new("dedisperser", &tools.dedisperser)
            .arg("-filterbank")
            .path_arg(&self.filterbank)
            .arg("-dm")
            .arg(format!("{:.3}", self.dm))
            .arg("-nobary")
            .arg("-noclip");
        if self.zero_dm {
            cmd = cmd.arg("-zerodm");
        }
        if let Some(list) = &self.ignore_chans {
            cmd = cmd.arg("-ignorechan").arg(list.clone());
        }
        cmd.arg("-o").arg(self.out_root.clone()).in_dir(&self.out_dir)
    }

    pub fn dat_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.dat", self.out_root))
    }

    pub fn inf_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.inf", self.out_root))
    }
}

/// Matched-filter single-pulse search over a dedispersed series.
#[derive(Debug, Clone)]
pub struct SinglePulseRequest {
    pub dat: PathBuf,
    pub threshold: f64,
    pub max_width_ms: f64,
    pub decimation: u32,
    pub skip_bad_blocks: bool,
}

impl SinglePulseRequest {
    pub fn command(&self, tools: &ToolPaths) -> StageCommand {
        let cmd = StageCommand::new("detector", &tools.detector)
            .path_arg(&self.dat)
            .arg("-t")
            .arg(format!("{:.3}", self.threshold))
            .arg("-m")
            .arg(format!("{:.1}", self.max_width_ms))
            .arg("-d")
            .arg(self.decimation.to_string());
        let cmd = if self.skip_bad_blocks { cmd.arg("-b") } else { cmd };
        match self.dat.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => cmd.in_dir(dir),
            _ => cmd,
        }
    }

    /// Candidate table the detector writes beside the series.
    pub fn table_path(&self) -> PathBuf {
        self.dat.with_extension("singlepulse")
    }
}

/// Cut a window of samples out of a filterbank file.
#[derive(Debug, Clone)]
pub struct SnippetRequest {
    pub source: PathBuf,
    pub start: u64,
    pub length: u64,
    pub output: PathBuf,
}

impl SnippetRequest {
    pub fn command(&self, tools: &ToolPaths) -> StageCommand {
        let mut cmd = StageCommand::new("extractor", &tools.extractor)
            .path_arg(&self.source)
            .arg(self.start.to_string())
            .arg(self.length.to_string());
        if let Some(dir) = self.source.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd = cmd.in_dir(dir);
        }
        cmd.stdout_to = Some(self.output.clone());
        cmd
    }
}

/// Runs requests through a [`CommandRunner`] and verifies their results.
pub struct ExternalStages<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    tools: &'a ToolPaths,
}

impl<'a, R: CommandRunner + ?Sized> ExternalStages<'a, R> {
    pub fn new(runner: &'a R, tools: &'a ToolPaths) -> Self {
        Self { runner, tools }
    }

    fn exec(&self, ctx: &RunContext, cmd: &StageCommand) -> Result<StageOutput, SearchError> {
        log::debug!("[{}] {}", ctx.tag(), cmd);
        let out = self
            .runner
            .run(cmd)
            .map_err(|e| SearchError::tool(cmd.tool, format!("could not run {}: {e}", cmd.program.display())))?;
        if !out.stderr.trim().is_empty() {
            log::debug!("[{}] {} stderr: {}", ctx.tag(), cmd.tool, out.stderr.trim());
        }
        if !out.success {
            let code = out.code.map_or_else(|| "a signal".to_string(), |c| c.to_string());
            let tail = out.stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(SearchError::tool(cmd.tool, format!("exited with {code}: {tail}")));
        }
        Ok(out)
    }

    fn expect_file(tool: &str, path: &Path) -> Result<(), SearchError> {
        if path.is_file() {
            Ok(())
        } else {
            Err(SearchError::tool(tool, format!("expected output {} was not produced", path.display())))
        }
    }

    pub fn fix_header(&self, ctx: &RunContext, req: &HeaderFixRequest) -> Result<(), SearchError> {
        let cmd = req.command(self.tools);
        self.exec(ctx, &cmd)?;
        Self::expect_file(cmd.tool, &req.filterbank)
    }

    pub fn decimate(&self, ctx: &RunContext, req: &DecimateRequest) -> Result<PathBuf, SearchError> {
        let cmd = req.command(self.tools);
        self.exec(ctx, &cmd)?;
        Self::expect_file(cmd.tool, &req.output)?;
        Ok(req.output.clone())
    }

    /// Returns the `.dat` and `.inf` paths.
    pub fn dedisperse(&self, ctx: &RunContext, req: &DedisperseRequest) -> Result<(PathBuf, PathBuf), SearchError> {
        let cmd = req.command(self.tools);
        self.exec(ctx, &cmd)?;
        let (dat, inf) = (req.dat_path(), req.inf_path());
        Self::expect_file(cmd.tool, &dat)?;
        Self::expect_file(cmd.tool, &inf)?;
        Ok((dat, inf))
    }

    /// Returns the candidate table path.
    pub fn search(&self, ctx: &RunContext, req: &SinglePulseRequest) -> Result<PathBuf, SearchError> {
        let cmd = req.command(self.tools);
        self.exec(ctx, &cmd)?;
        let table = req.table_path();
        Self::expect_file(cmd.tool, &table)?;
        Ok(table)
    }

    pub fn extract(&self, ctx: &RunContext, req: &SnippetRequest) -> Result<PathBuf, SearchError> {
        let cmd = req.command(self.tools);
        self.exec(ctx, &cmd)?;
        let produced = std::fs::metadata(&req.output).map(|m| m.len() > 0).unwrap_or(false);
        if !produced {
            return Err(SearchError::tool(
                cmd.tool,
                format!("snippet {} is missing or empty", req.output.display()),
            ));
        }
        Ok(req.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedisperse_omits_flag_without_zaps() {
        let mut req = DedisperseRequest {
            filterbank: PathBuf::from("/data/c1/obs.fil"),
            dm: 87.77,
            ignore_chans: None,
            zero_dm: false,
            out_dir: PathBuf::from("/data/c1"),
            out_root: "obs_DM87.770".into(),
        };
        let cmd = req.command(&ToolPaths::default());
        assert_eq!(
            cmd.to_string(),
            "prepdata -filterbank /data/c1/obs.fil -dm 87.770 -nobary -noclip -o obs_DM87.770"
        );
        req.ignore_chans = Some("0,1,223".into());
        req.zero_dm = true;
        let args = req.command(&ToolPaths::default()).args;
        let pos = args.iter().position(|a| a == "-ignorechan").unwrap();
        assert_eq!(args[pos + 1], "0,1,223");
        assert!(args.contains(&"-zerodm".to_string()));
    }

    #[test]
    fn header_fix_uses_tool_prefix() {
        let mut tools = ToolPaths::default();
        tools.header_fix = ToolSpec {
            program: "python".into(),
            args: vec!["/src/fix_sigproc_header.py".into()],
        };
        let req = HeaderFixRequest {
            filterbank: "obs.fil".into(),
            telescope: "RO".into(),
            dsn: true,
        };
        assert_eq!(
            req.command(&tools).to_string(),
            "python /src/fix_sigproc_header.py --filterbank obs.fil --telescope RO --dsn"
        );
    }

    #[test]
    fn detector_table_path() {
        let req = SinglePulseRequest {
            dat: "/d/obs_DM87.770.dat".into(),
            threshold: 6.0,
            max_width_ms: 10.0,
            decimation: 32,
            skip_bad_blocks: true,
        };
        assert_eq!(req.table_path(), PathBuf::from("/d/obs_DM87.770.singlepulse"));
        assert_eq!(
            req.command(&ToolPaths::default()).to_string(),
            "single_pulse_search.py /d/obs_DM87.770.dat -t 6.000 -m 10.0 -d 32 -b"
        );
    }
}
