use std::path::PathBuf;

use bbsearch::io_utils::{search_cli_error, simple_cli_error};
use bbsearch::{
    ExtractBackend, ProcessRunner, RunContext, SearchConfig, SearchOrchestrator, ToolPaths, WindowPolicy, ZapSpec,
    DEFAULT_BLOCK_SAMPLES,
};
use clap::Parser;

/// Search every filterbank file in a directory for single pulses.
#[derive(Parser, Debug)]
#[clap(name = "bbsearch", version)]
struct SearchArgs {
    /// Root name of the per-file staging directories
    #[clap(short = 'o', long, default_value = "cand")]
    obsroot: String,
    /// Number of subbands
    #[clap(long)]
    nsub: u32,
    /// Channels per subband
    #[clap(long = "nchansub")]
    chans_per_sub: u32,
    /// Channels to zap at each edge of every subband
    #[clap(long = "edgezap", default_value_t = 2, allow_hyphen_values = true)]
    edge_zap: i32,
    /// Extra channels to zap, e.g. "0:3,17" (0 = top of band)
    #[clap(long = "zapchans", default_value = "")]
    zap_chans: ZapSpec,
    /// Dispersion measure for dedispersion and searching
    #[clap(long)]
    dm: f64,
    /// Single-pulse S/N threshold
    #[clap(long = "snr", default_value_t = 6.0)]
    snr_threshold: f64,
    /// Length of each extracted snippet in seconds
    #[clap(long = "extract-time", default_value_t = 0.1)]
    snippet_duration: f64,
    /// Telescope code passed to the header fixer; omit to leave headers alone
    #[clap(long)]
    telescope: Option<String>,
    /// Use the placeholder DSN machine id when fixing headers
    #[clap(long)]
    dsn: bool,
    /// Largest boxcar width to search, in milliseconds
    #[clap(long = "max-width", default_value_t = 10.0)]
    max_width_ms: f64,
    /// Detector downsampling factor
    #[clap(long = "decimate", default_value_t = 32)]
    detector_decimation: u32,
    /// Do not ask the detector to skip bad blocks
    #[clap(long)]
    keep_bad_blocks: bool,
    /// Apply the zero-DM filter when dedispersing
    #[clap(long)]
    zerodm: bool,
    /// Also write a time-averaged copy for RFI inspection
    #[clap(long = "rfi-avg")]
    rfi_decimation: Option<u32>,
    /// Threads for the channelizer
    #[clap(long, default_value_t = 1)]
    threads: u32,
    /// Time samples per block for native I/O
    #[clap(long, default_value_t = DEFAULT_BLOCK_SAMPLES)]
    block_size: u64,
    /// Snippet extraction backend
    #[clap(long, value_enum, default_value_t = ExtractBackend::External)]
    extractor: ExtractBackend,
    /// What to do with windows overhanging the file
    #[clap(long, value_enum, default_value_t = WindowPolicy::Clamp)]
    window_policy: WindowPolicy,
    /// Write a channel-zapped copy of every snippet
    #[clap(long)]
    zap_snippets: bool,
    /// JSON file describing external tool locations
    #[clap(long)]
    tools: Option<PathBuf>,
    /// Directory holding the input .fil files
    #[clap(long, default_value = ".")]
    workdir: PathBuf,
    /// Disable progress bars
    #[clap(long)]
    quiet: bool,
}

impl SearchArgs {
    fn into_config(self) -> Result<SearchConfig, bbsearch::SearchError> {
        let tools = match &self.tools {
            Some(path) => ToolPaths::load(path)?,
            None => ToolPaths::default(),
        };
        let config = SearchConfig {
            obsroot: self.obsroot,
            nsub: self.nsub,
            chans_per_sub: self.chans_per_sub,
            edge_zap: self.edge_zap,
            zap_chans: self.zap_chans,
            dm: self.dm,
            snr_threshold: self.snr_threshold,
            snippet_duration: self.snippet_duration,
            telescope: self.telescope,
            dsn: self.dsn,
            max_width_ms: self.max_width_ms,
            detector_decimation: self.detector_decimation,
            skip_bad_blocks: !self.keep_bad_blocks,
            zero_dm: self.zerodm,
            rfi_decimation: self.rfi_decimation,
            threads: self.threads,
            block_size: self.block_size,
            extract_backend: self.extractor,
            window_policy: self.window_policy,
            zap_snippets: self.zap_snippets,
            tools,
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = SearchArgs::parse();
    let workdir = args.workdir.clone();
    let ctx = RunContext::new("bbsearch").with_progress(!args.quiet);
    let config = args
        .into_config()
        .map_err(|e| search_cli_error("configuration", e))?;

    let orchestrator = SearchOrchestrator::new(config, ProcessRunner, ctx);
    let report = orchestrator
        .run(&workdir)
        .map_err(|e| search_cli_error("search", e))?;

    let failed = report.failed_count();
    if failed > 0 {
        return Err(Box::new(simple_cli_error(&format!(
            "{failed} of {} file(s) failed; see {}",
            report.files.len(),
            orchestrator.report_path(&workdir).display()
        ))));
    }
    Ok(())
}
