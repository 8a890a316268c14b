use std::io;
use std::path::PathBuf;

use bbsearch::io_utils::{check_readable, search_cli_error, simple_cli_error};
use bbsearch::{
    plan_snippets, read_candidates, read_sampling_interval, write_plan_csv, RunContext, WindowOptions, WindowPolicy,
};
use clap::Parser;

/// Print a single-pulse candidate table with the snippet window of each row.
#[derive(Parser)]
struct Args {
    /// Candidate table written by the detector
    table: PathBuf,
    /// Sampling interval in seconds
    #[clap(long, conflicts_with = "inf", required_unless_present = "inf")]
    tsamp: Option<f64>,
    /// Read the sampling interval from this .inf file instead
    #[clap(long)]
    inf: Option<PathBuf>,
    /// Snippet length in seconds
    #[clap(long, default_value_t = 0.1)]
    duration: f64,
    /// Samples in the source file, for bounds checks
    #[clap(long, default_value_t = u64::MAX)]
    total_samples: u64,
    #[clap(long, value_enum, default_value_t = WindowPolicy::Clamp)]
    policy: WindowPolicy,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    check_readable(&args.table)?;
    let tsamp = match &args.inf {
        Some(inf) => {
            check_readable(inf)?;
            read_sampling_interval(inf).map_err(|e| search_cli_error("metadata", e))?
        }
        None => args.tsamp.ok_or_else(|| simple_cli_error("--tsamp or --inf is required"))?,
    };
    let candidates = read_candidates(&args.table).map_err(|e| search_cli_error("candidates", e))?;

    let root = args
        .table
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("cands")
        .to_string();
    let dir = args.table.parent().map(PathBuf::from).unwrap_or_default();
    let opts = WindowOptions {
        duration: args.duration,
        tsamp,
        total_samples: args.total_samples,
        policy: args.policy,
    };
    let ctx = RunContext::quiet("spcands");
    let plans = plan_snippets(&ctx, &candidates, &opts, &dir, &root).map_err(|e| search_cli_error("windows", e))?;
    write_plan_csv(io::stdout().lock(), &plans).map_err(|e| search_cli_error("output", e))?;
    Ok(())
}
