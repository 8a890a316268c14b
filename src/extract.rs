//! Extraction windows around detected pulses.
//!
//! A window is `round(duration / tsamp)` samples long and centred on the
//! candidate's sample. Rounding is half-to-even for both the length and the
//! half-width offset. Candidates are numbered by their 1-based position in
//! the detector's table; numbers never shift when a window is skipped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::candidates::CandidateRecord;
use crate::context::RunContext;
use crate::SearchError;

/// Requested window, before any bounds policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractionWindow {
    /// First sample; negative when the pulse is near the start of the file.
    pub start: i64,
    pub length: u64,
}

impl ExtractionWindow {
    /// One past the last sample, or `None` when that overflows `i64`.
    pub fn end(&self) -> Option<i64> {
        i64::try_from(self.length).ok().and_then(|len| self.start.checked_add(len))
    }

    pub fn in_bounds(&self, total_samples: u64) -> bool {
        self.start >= 0 && self.end().is_some_and(|end| end as u64 <= total_samples)
    }
}

/// Window length in samples for a snippet of `duration` seconds.
pub fn window_length(duration: f64, tsamp: f64) -> Result<u64, SearchError> {
    if !(duration > 0.0 && tsamp > 0.0 && duration.is_finite() && tsamp.is_finite()) {
        return Err(SearchError::Config(format!(
            "snippet duration {duration}s with sampling interval {tsamp}s"
        )));
    }
    let length = (duration / tsamp).round_ties_even();
    if length < 1.0 {
        return Err(SearchError::Config(format!(
            "snippet duration {duration}s is shorter than one {tsamp}s sample"
        )));
    }
    Ok(length as u64)
}

pub fn window_for(candidate: &CandidateRecord, duration: f64, tsamp: f64) -> Result<ExtractionWindow, SearchError> {
    let length = window_length(duration, tsamp)?;
    let half = (length as f64 / 2.0).round_ties_even() as i64;
    i64::try_from(candidate.sample)
        .ok()
        .and_then(|sample| sample.checked_sub(half))
        .map(|start| ExtractionWindow { start, length })
        .filter(|w| w.end().is_some())
        .ok_or_else(|| {
            SearchError::Range(format!(
                "{length}-sample window around sample {} is not addressable",
                candidate.sample
            ))
        })
}

/// What to do with a window that overhangs the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WindowPolicy {
    /// Trim to the file and log the truncation.
    #[default]
    Clamp,
    /// Leave the candidate without a snippet.
    Skip,
    /// Abort the file with a range error.
    Fail,
}

/// Where a window ends up once the policy is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Placement {
    Whole { start: u64, length: u64 },
    Clamped { start: u64, length: u64 },
    Skipped { reason: String },
}

impl Placement {
    /// `(start, length)` to cut, if anything is to be cut.
    pub fn span(&self) -> Option<(u64, u64)> {
        match *self {
            Placement::Whole { start, length } | Placement::Clamped { start, length } => Some((start, length)),
            Placement::Skipped { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Placement::Whole { .. } => "whole",
            Placement::Clamped { .. } => "clamped",
            Placement::Skipped { .. } => "skipped",
        }
    }
}

pub fn place(window: &ExtractionWindow, total_samples: u64, policy: WindowPolicy) -> Result<Placement, SearchError> {
    let end = window.end().ok_or_else(|| {
        SearchError::Range(format!(
            "window of {} samples at {} is not addressable",
            window.length, window.start
        ))
    })?;
    if window.in_bounds(total_samples) {
        return Ok(Placement::Whole {
            start: window.start as u64,
            length: window.length,
        });
    }
    let reason = format!("window {}..{end} overhangs 0..{total_samples}", window.start);
    match policy {
        WindowPolicy::Fail => Err(SearchError::Range(reason)),
        WindowPolicy::Skip => Ok(Placement::Skipped { reason }),
        WindowPolicy::Clamp => {
            let lo = window.start.max(0);
            let hi = end.min(i64::try_from(total_samples).unwrap_or(i64::MAX));
            if hi <= lo {
                Ok(Placement::Skipped { reason })
            } else {
                Ok(Placement::Clamped {
                    start: lo as u64,
                    length: (hi - lo) as u64,
                })
            }
        }
    }
}

/// Parameters shared by every window of one file.
#[derive(Debug, Clone, Copy)]
pub struct WindowOptions {
    pub duration: f64,
    pub tsamp: f64,
    pub total_samples: u64,
    pub policy: WindowPolicy,
}

/// One candidate's snippet request.
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetPlan {
    /// 1-based position in the candidate table.
    pub number: usize,
    pub candidate: CandidateRecord,
    pub window: ExtractionWindow,
    pub placement: Placement,
    pub output: PathBuf,
}

pub fn snippet_name(root: &str, number: usize) -> String {
    format!("{root}_extract_cand{number}.fil")
}

/// Build one plan per candidate, in table order.
pub fn plan_snippets(
    ctx: &RunContext,
    candidates: &[CandidateRecord],
    opts: &WindowOptions,
    out_dir: &Path,
    root: &str,
) -> Result<Vec<SnippetPlan>, SearchError> {
    let mut plans = Vec::with_capacity(candidates.len());
    for (i, cand) in candidates.iter().enumerate() {
        let number = i + 1;
        let window = window_for(cand, opts.duration, opts.tsamp)?;
        let placement = place(&window, opts.total_samples, opts.policy)?;
        match &placement {
            Placement::Clamped { start, length } => log::warn!(
                "[{}] candidate {number}: window {}+{} truncated to {start}+{length}",
                ctx.tag(),
                window.start,
                window.length
            ),
            Placement::Skipped { reason } => {
                log::warn!("[{}] candidate {number}: skipped, {reason}", ctx.tag())
            }
            Placement::Whole { .. } => {}
        }
        plans.push(SnippetPlan {
            number,
            candidate: cand.clone(),
            window,
            placement,
            output: out_dir.join(snippet_name(root, number)),
        });
    }
    Ok(plans)
}

#[derive(Serialize)]
struct CandidateRow<'a> {
    number: usize,
    dm: f64,
    snr: f64,
    time: f64,
    sample: u64,
    downfact: u32,
    window_start: i64,
    window_length: u64,
    status: &'static str,
    start: Option<u64>,
    length: Option<u64>,
    snippet: Option<&'a str>,
}

/// Write one CSV row per plan to `out`.
pub fn write_plan_csv<W: std::io::Write>(out: W, plans: &[SnippetPlan]) -> Result<(), SearchError> {
    let mut wtr = csv::Writer::from_writer(out);
    for plan in plans {
        let span = plan.placement.span();
        let snippet = span.and_then(|_| plan.output.file_name()).and_then(|n| n.to_str());
        wtr.serialize(CandidateRow {
            number: plan.number,
            dm: plan.candidate.dm,
            snr: plan.candidate.snr,
            time: plan.candidate.time,
            sample: plan.candidate.sample,
            downfact: plan.candidate.downfact,
            window_start: plan.window.start,
            window_length: plan.window.length,
            status: plan.placement.label(),
            start: span.map(|s| s.0),
            length: span.map(|s| s.1),
            snippet,
        })
        .map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(())
}

fn csv_error(err: csv::Error) -> SearchError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => SearchError::Io(e),
        other => SearchError::Config(format!("csv: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(sample: u64) -> CandidateRecord {
        CandidateRecord {
            dm: 87.77,
            snr: 8.0,
            time: 0.0,
            sample,
            downfact: 1,
        }
    }

    #[test]
    fn half_width_rounds_to_even() {
        assert_eq!(window_length(2.5, 1.0).unwrap(), 2);
        assert_eq!(window_length(3.5, 1.0).unwrap(), 4);
        // 5 samples -> half 2.5 -> 2.
        let w = window_for(&cand(10), 5.0, 1.0).unwrap();
        assert_eq!(w.start, 8);
        // 7 samples -> half 3.5 -> 4.
        let w = window_for(&cand(10), 7.0, 1.0).unwrap();
        assert_eq!(w.start, 6);
        // 0.1 s at 65.536 us is 1525.88 -> 1526 samples, half 763.
        let w = window_for(&cand(10_000), 0.1, 6.5536e-5).unwrap();
        assert_eq!(w.length, 1526);
        assert_eq!(w.start, 10_000 - 763);
    }

    #[test]
    fn clamp_trims_both_ends() {
        let w = ExtractionWindow { start: -5, length: 20 };
        assert_eq!(
            place(&w, 100, WindowPolicy::Clamp).unwrap(),
            Placement::Clamped { start: 0, length: 15 }
        );
        let w = ExtractionWindow { start: 90, length: 20 };
        assert_eq!(
            place(&w, 100, WindowPolicy::Clamp).unwrap(),
            Placement::Clamped { start: 90, length: 10 }
        );
    }

    #[test]
    fn clamp_with_no_overlap_skips() {
        let w = ExtractionWindow { start: 120, length: 10 };
        assert!(matches!(place(&w, 100, WindowPolicy::Clamp).unwrap(), Placement::Skipped { .. }));
    }

    #[test]
    fn fail_policy_is_range_error() {
        let w = ExtractionWindow { start: -1, length: 10 };
        assert!(matches!(place(&w, 100, WindowPolicy::Fail), Err(SearchError::Range(_))));
        let w = ExtractionWindow { start: 0, length: 100 };
        assert!(place(&w, 100, WindowPolicy::Fail).is_ok());
    }

    #[test]
    fn unaddressable_windows_are_range_errors() {
        assert!(matches!(window_for(&cand(u64::MAX), 5.0, 1.0), Err(SearchError::Range(_))));
        assert!(matches!(window_for(&cand(i64::MAX as u64), 5.0, 1.0), Err(SearchError::Range(_))));
        let w = ExtractionWindow { start: i64::MAX - 2, length: 10 };
        assert_eq!(w.end(), None);
        assert!(!w.in_bounds(u64::MAX));
        assert!(matches!(place(&w, u64::MAX, WindowPolicy::Clamp), Err(SearchError::Range(_))));
    }

    #[test]
    fn too_short_duration_rejected() {
        assert!(window_length(1e-6, 1e-3).is_err());
        assert!(window_length(0.1, 0.0).is_err());
    }
}
