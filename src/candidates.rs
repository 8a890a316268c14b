//! Single-pulse candidate tables written by the pulse detector.
//!
//! The first line is a column label line and is ignored. Every other
//! non-blank line holds five whitespace-separated numbers:
//! `DM  SNR  time(s)  sample  boxcar-width`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;

use crate::SearchError;

const FIELDS: usize = 5;

/// One detected pulse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    pub dm: f64,
    pub snr: f64,
    /// Arrival time in seconds from the start of the series.
    pub time: f64,
    /// Arrival sample index.
    pub sample: u64,
    /// Boxcar width in samples.
    pub downfact: u32,
}

/// Read a candidate table, preserving row order.
pub fn read_candidates<P: AsRef<Path>>(path: P) -> Result<Vec<CandidateRecord>, SearchError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    parse_candidates(BufReader::new(file), path)
}

/// Parse a candidate table from any buffered source. `path` labels errors.
pub fn parse_candidates<R: BufRead>(reader: R, path: &Path) -> Result<Vec<CandidateRecord>, SearchError> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line_no == 1 || line.trim().is_empty() {
            continue;
        }
        out.push(parse_row(&line, line_no, path)?);
    }
    Ok(out)
}

fn parse_row(line: &str, line_no: usize, path: &Path) -> Result<CandidateRecord, SearchError> {
    let bad = |msg: String| SearchError::Row {
        path: path.to_path_buf(),
        line: line_no,
        msg,
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != FIELDS {
        return Err(bad(format!("expected {FIELDS} fields, found {}", fields.len())));
    }
    let mut values = [0f64; FIELDS];
    for (slot, field) in values.iter_mut().zip(&fields) {
        *slot = field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| bad(format!("`{field}` is not a number")))?;
    }

    let sample = whole(values[3]).ok_or_else(|| bad(format!("sample `{}` is not a sample index", fields[3])))?;
    let downfact = whole(values[4])
        .and_then(|w| u32::try_from(w).ok())
        .ok_or_else(|| bad(format!("width `{}` is not a sample count", fields[4])))?;

    Ok(CandidateRecord {
        dm: values[0],
        snr: values[1],
        time: values[2],
        sample,
        downfact,
    })
}

/// Non-negative integral value, as the detector prints them (`1234` or `1234.0`).
fn whole(v: f64) -> Option<u64> {
    // Sample indices are later offset as signed window starts.
    if v >= 0.0 && v.fract() == 0.0 && v < i64::MAX as f64 {
        Some(v as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<Vec<CandidateRecord>, SearchError> {
        parse_candidates(Cursor::new(text), Path::new("t.singlepulse"))
    }

    #[test]
    fn header_only_is_empty() {
        assert!(parse("# DM Sigma Time (s) Sample Downfact\n").unwrap().is_empty());
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn integral_floats_accepted() {
        let c = parse("#\n87.77 7.1 0.5 7812.0 3.0\n").unwrap();
        assert_eq!(c[0].sample, 7812);
        assert_eq!(c[0].downfact, 3);
    }

    #[test]
    fn reports_line_number() {
        let err = parse("# hdr\n\n87.7 6.0 0.1 100 1\n87.7 six 0.2 200 1\n").unwrap_err();
        match err {
            SearchError::Row { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrong_field_count() {
        let err = parse("# hdr\n87.7 6.0 0.1 100\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(err.to_string().contains("expected 5 fields"));
    }

    #[test]
    fn negative_sample_rejected() {
        assert!(parse("# hdr\n87.7 6.0 0.1 -3 1\n").is_err());
        assert!(parse("# hdr\n87.7 6.0 0.1 3.5 1\n").is_err());
    }

    #[test]
    fn sample_beyond_signed_range_rejected() {
        let err = parse("# hdr\n87.7 6.0 0.1 9223372036854775808 1\n").unwrap_err();
        assert!(matches!(err, SearchError::Row { line: 2, .. }));
        assert!(parse("# hdr\n87.7 6.0 0.1 1e300 1\n").is_err());
        assert_eq!(parse("# hdr\n87.7 6.0 0.1 4611686018427387904 1\n").unwrap()[0].sample, 1 << 62);
    }
}
