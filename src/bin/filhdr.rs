use std::path::PathBuf;

use bbsearch::io_utils::{check_readable, search_cli_error};
use bbsearch::SpectralReader;
use clap::Parser;

/// Dump a filterbank header as JSON.
#[derive(Parser)]
struct Args {
    /// Filterbank file
    input: PathBuf,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    check_readable(&args.input)?;
    let reader = SpectralReader::open(&args.input).map_err(|e| search_cli_error("header", e))?;
    let header = reader.header();

    let mut fields = serde_json::Map::new();
    for (key, value) in header.entries() {
        fields.insert(key.clone(), serde_json::to_value(value)?);
    }
    let out = serde_json::json!({
        "path": args.input,
        "header_bytes": header.encoded_len(),
        "total_samples": reader.total_samples(),
        "duration_s": reader.total_samples() as f64 * header.tsamp(),
        "header": fields,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
