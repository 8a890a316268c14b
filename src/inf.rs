//! Metadata sidecar (`.inf`) written next to each dedispersed series.
//!
//! Lines look like `  Width of each time series bin (sec)    =  6.4e-05`.
//! Only `key = value` lines are kept; everything else is ignored.

use std::fs;
use std::path::{Path, PathBuf};

use crate::SearchError;

/// Key prefix of the sampling-interval line.
pub const SAMPLING_INTERVAL_KEY: &str = "Width";

#[derive(Debug, Clone)]
pub struct InfFile {
    path: PathBuf,
    entries: Vec<(String, String)>,
}

impl InfFile {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text, path))
    }

    pub fn parse(text: &str, path: &Path) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Value of the first key starting with `prefix`.
    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| v.as_str())
    }

    pub fn numeric(&self, prefix: &str) -> Result<f64, SearchError> {
        let raw = self
            .get(prefix)
            .ok_or_else(|| SearchError::format(&self.path, format!("no `{prefix}` line")))?;
        raw.parse::<f64>()
            .map_err(|_| SearchError::format(&self.path, format!("`{prefix}` value `{raw}` is not numeric")))
    }

    /// Sampling interval in seconds.
    pub fn sampling_interval(&self) -> Result<f64, SearchError> {
        let tsamp = self.numeric(SAMPLING_INTERVAL_KEY)?;
        if tsamp > 0.0 && tsamp.is_finite() {
            Ok(tsamp)
        } else {
            Err(SearchError::format(&self.path, format!("sampling interval {tsamp} is not positive")))
        }
    }
}

pub fn read_sampling_interval<P: AsRef<Path>>(path: P) -> Result<f64, SearchError> {
    InfFile::read(path)?.sampling_interval()
}
