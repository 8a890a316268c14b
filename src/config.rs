use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::extract::WindowPolicy;
use crate::stream::DEFAULT_BLOCK_SAMPLES;
use crate::zap::{ZapPlan, ZapSpec};
use crate::SearchError;

/// How to invoke one external program: executable plus leading arguments
/// (e.g. `python` + `fix_sigproc_header.py`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

/// Locations of the external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub header_fix: ToolSpec,
    pub channelizer: ToolSpec,
    pub dedisperser: ToolSpec,
    pub detector: ToolSpec,
    pub extractor: ToolSpec,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            header_fix: ToolSpec::new("fix_sigproc_header.py"),
            channelizer: ToolSpec::new("digifil"),
            dedisperser: ToolSpec::new("prepdata"),
            detector: ToolSpec::new("single_pulse_search.py"),
            extractor: ToolSpec::new("extract"),
        }
    }
}

impl ToolPaths {
    /// Load tool locations from a JSON file; missing entries keep defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| SearchError::Config(format!("tool file {}: {e}", path.display())))
    }
}

/// Where candidate snippets are cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractBackend {
    /// The external snippet extractor.
    #[default]
    External,
    /// The built-in block stream.
    Native,
}

/// Runtime configuration for one search run.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Staging directories are `<obsroot><n>`.
    pub obsroot: String,
    pub nsub: u32,
    pub chans_per_sub: u32,
    pub edge_zap: i32,
    /// Extra channels to exclude, top-first numbering.
    pub zap_chans: ZapSpec,
    pub dm: f64,
    pub snr_threshold: f64,
    /// Snippet length in seconds.
    pub snippet_duration: f64,
    /// Telescope code for the header fixer; `None` skips that stage.
    pub telescope: Option<String>,
    /// Ask the header fixer for the placeholder machine id.
    pub dsn: bool,
    pub max_width_ms: f64,
    pub detector_decimation: u32,
    pub skip_bad_blocks: bool,
    pub zero_dm: bool,
    /// Time decimation for the RFI inspection product; `None` skips it.
    pub rfi_decimation: Option<u32>,
    pub threads: u32,
    pub block_size: u64,
    pub extract_backend: ExtractBackend,
    pub window_policy: WindowPolicy,
    /// Also write `<snippet>_zapedge.fil` with the zap set applied.
    pub zap_snippets: bool,
    pub tools: ToolPaths,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            obsroot: "cand".to_string(),
            nsub: 1,
            chans_per_sub: 0,
            edge_zap: 2,
            zap_chans: ZapSpec::default(),
            dm: 0.0,
            snr_threshold: 6.0,
            snippet_duration: 0.1,
            telescope: None,
            dsn: false,
            max_width_ms: 10.0,
            detector_decimation: 32,
            skip_bad_blocks: true,
            zero_dm: false,
            rfi_decimation: None,
            threads: 1,
            block_size: DEFAULT_BLOCK_SAMPLES,
            extract_backend: ExtractBackend::External,
            window_policy: WindowPolicy::Clamp,
            zap_snippets: false,
            tools: ToolPaths::default(),
        }
    }
}

impl SearchConfig {
    pub fn total_channels(&self) -> u32 {
        self.nsub.saturating_mul(self.chans_per_sub)
    }

    pub fn zap_plan(&self) -> ZapPlan {
        ZapPlan {
            nsub: self.nsub,
            chans_per_sub: self.chans_per_sub,
            edge_zap: self.edge_zap,
            explicit: self.zap_chans.clone(),
        }
    }

    /// Reject settings no file could succeed with.
    pub fn validate(&self) -> Result<(), SearchError> {
        let bad = |msg: String| Err(SearchError::Config(msg));
        if self.obsroot.is_empty() || self.obsroot.contains(std::path::MAIN_SEPARATOR) {
            return bad(format!("obsroot `{}` must be a plain name", self.obsroot));
        }
        if self.nsub == 0 || self.chans_per_sub == 0 {
            return bad(format!(
                "need at least one subband and channel (nsub={}, nchansub={})",
                self.nsub, self.chans_per_sub
            ));
        }
        if !(self.dm >= 0.0 && self.dm.is_finite()) {
            return bad(format!("dispersion measure {} is not usable", self.dm));
        }
        if !(self.snippet_duration > 0.0 && self.snippet_duration.is_finite()) {
            return bad(format!("snippet duration {} must be positive", self.snippet_duration));
        }
        if self.block_size == 0 {
            return bad("block size must be non-zero".to_string());
        }
        if self.detector_decimation == 0 || self.threads == 0 {
            return bad("decimation and thread counts must be non-zero".to_string());
        }
        if self.rfi_decimation == Some(0) {
            return bad("RFI decimation factor must be non-zero".to_string());
        }
        self.zap_chans.check(self.total_channels() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SearchConfig {
        SearchConfig {
            nsub: 7,
            chans_per_sub: 32,
            dm: 87.77,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn default_needs_channels() {
        assert!(SearchConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn explicit_zap_checked_against_band() {
        let cfg = SearchConfig {
            zap_chans: ZapSpec::parse("224").unwrap(),
            ..valid()
        };
        assert!(matches!(cfg.validate(), Err(SearchError::Config(_))));
    }

    #[test]
    fn partial_tool_file_keeps_defaults() {
        let tools: ToolPaths =
            serde_json::from_str(r#"{"header_fix": {"program": "python", "args": ["fix.py"]}}"#).unwrap();
        assert_eq!(tools.header_fix.args, vec!["fix.py".to_string()]);
        assert_eq!(tools.dedisperser, ToolSpec::new("prepdata"));
    }
}
