//! Single-pulse search over channelised radio-telescope recordings.
//!
//! The library streams sigproc filterbank files block by block, plans the
//! channels to exclude from dedispersion, parses the detector's candidate
//! tables and cuts a snippet around every candidate. [`SearchOrchestrator`]
//! sequences those steps and the external tools around them per input file.

mod block;
mod candidates;
mod config;
mod context;
mod error;
mod extract;
mod header;
mod inf;
pub mod io_utils;
mod pipeline;
mod stage;
mod stream;
mod zap;

pub use block::{BlockData, Sample, SpectralBlock};
pub use candidates::{parse_candidates, read_candidates, CandidateRecord};
pub use config::{ExtractBackend, SearchConfig, ToolPaths, ToolSpec};
pub use context::RunContext;
pub use error::SearchError;
pub use extract::{
    place, plan_snippets, snippet_name, window_for, window_length, write_plan_csv, ExtractionWindow, Placement,
    SnippetPlan, WindowOptions, WindowPolicy,
};
pub use header::{keyword_kind, HeaderValue, SpectralHeader, ValueKind, SUPPORTED_NBITS};
pub use inf::{read_sampling_interval, InfFile, SAMPLING_INTERVAL_KEY};
pub use pipeline::{BatchReport, FileOutcome, FileStage, SearchOrchestrator};
pub use stage::{
    CommandRunner, DecimateRequest, DedisperseRequest, ExternalStages, HeaderFixRequest, ProcessRunner,
    SinglePulseRequest, SnippetRequest, StageCommand, StageOutput,
};
pub use stream::{copy_range, zap_file, Blocks, SpectralReader, SpectralWriter, DEFAULT_BLOCK_SAMPLES};
pub use zap::{BottomFirst, TopFirst, ZapPlan, ZapSet, ZapSpec};
