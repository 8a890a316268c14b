use std::path::PathBuf;

use bbsearch::io_utils::{check_readable, require_extension, search_cli_error};
use bbsearch::{zap_file, RunContext, ZapSpec, DEFAULT_BLOCK_SAMPLES};
use clap::Parser;

/// Zero whole channels of a filterbank file, block by block.
#[derive(Parser)]
struct Args {
    /// Input filterbank file
    input: PathBuf,
    /// Output filterbank file
    output: PathBuf,
    /// Channels to zero, e.g. "0:3,17" (0 = top of band)
    #[clap(long)]
    chans: ZapSpec,
    /// Time samples per block
    #[clap(long, default_value_t = DEFAULT_BLOCK_SAMPLES)]
    block_size: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    require_extension(&args.input, "fil")?;
    check_readable(&args.input)?;
    let ctx = RunContext::new("zapfil");
    zap_file(&ctx, &args.input, &args.output, &args.chans, args.block_size)
        .map_err(|e| search_cli_error("zap", e))?;
    Ok(())
}
