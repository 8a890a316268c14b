//! Sigproc filterbank header codec.
//!
//! A header is a run of length-prefixed keyword strings framed by
//! `HEADER_START` and `HEADER_END`:
//!
//! ```text
//! [len u32][HEADER_START] ([len u32][keyword][value])* [len u32][HEADER_END]
//! ```
//!
//! * every string is a little-endian `u32` length followed by ASCII bytes;
//! * the value width is fixed by the keyword (see [`keyword_kind`]):
//!   `i32`, `f64`, a length-prefixed string, a single byte, or nothing for
//!   the frequency-table markers;
//! * all numbers are little endian.
//!
//! Entries are kept in file order so that [`SpectralHeader::encode`] gives
//! back the exact bytes that were read. Downstream tools identify the
//! instrument from these fields, so derived files copy them verbatim.

use std::io::{self, Read};
use std::path::Path;

use serde::Serialize;

use crate::SearchError;

const HEADER_START: &str = "HEADER_START";
const HEADER_END: &str = "HEADER_END";
/// Longest keyword or string value accepted while parsing.
const MAX_STRING_LEN: usize = 1024;

/// Sample widths this crate can stream.
pub const SUPPORTED_NBITS: [u32; 3] = [8, 16, 32];

/// Value stored against a header keyword.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Int(i32),
    Double(f64),
    Str(String),
    Byte(u8),
    /// Keyword with no payload (`FREQUENCY_START` / `FREQUENCY_END`).
    Marker,
}

/// Width class of a sigproc keyword's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Double,
    Str,
    Byte,
    Marker,
}

/// Look up the value type of a sigproc keyword.
pub fn keyword_kind(keyword: &str) -> Option<ValueKind> {
    let kind = match keyword {
        "telescope_id" | "machine_id" | "data_type" | "barycentric" | "pulsarcentric"
        | "nbits" | "nsamples" | "nchans" | "nifs" | "nbeams" | "ibeam" => ValueKind::Int,
        "tstart" | "tsamp" | "fch1" | "foff" | "refdm" | "az_start" | "za_start" | "src_raj"
        | "src_dej" | "period" | "fchannel" => ValueKind::Double,
        "source_name" | "rawdatafile" => ValueKind::Str,
        "signed" => ValueKind::Byte,
        "FREQUENCY_START" | "FREQUENCY_END" => ValueKind::Marker,
        _ => return None,
    };
    Some(kind)
}

impl HeaderValue {
    fn kind(&self) -> ValueKind {
        match self {
            HeaderValue::Int(_) => ValueKind::Int,
            HeaderValue::Double(_) => ValueKind::Double,
            HeaderValue::Str(_) => ValueKind::Str,
            HeaderValue::Byte(_) => ValueKind::Byte,
            HeaderValue::Marker => ValueKind::Marker,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            HeaderValue::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            HeaderValue::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
            HeaderValue::Str(s) => put_string(out, s),
            HeaderValue::Byte(b) => out.push(*b),
            HeaderValue::Marker => {}
        }
    }
}

/// Observation metadata at the front of a filterbank file.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralHeader {
    entries: Vec<(String, HeaderValue)>,
}

impl SpectralHeader {
    /// Build a minimal header for a synthetic or freshly channelized file.
    pub fn new(nchans: usize, nbits: u32, tsamp: f64, fch1: f64, foff: f64) -> Result<Self, SearchError> {
        let nchans = i32::try_from(nchans)
            .map_err(|_| SearchError::Config(format!("{nchans} channels do not fit the nchans field")))?;
        let nbits = i32::try_from(nbits)
            .map_err(|_| SearchError::Config(format!("{nbits} bits do not fit the nbits field")))?;
        let entries = vec![
            ("telescope_id".to_string(), HeaderValue::Int(0)),
            ("machine_id".to_string(), HeaderValue::Int(0)),
            ("data_type".to_string(), HeaderValue::Int(1)),
            ("source_name".to_string(), HeaderValue::Str(String::new())),
            ("fch1".to_string(), HeaderValue::Double(fch1)),
            ("foff".to_string(), HeaderValue::Double(foff)),
            ("nchans".to_string(), HeaderValue::Int(nchans)),
            ("nbits".to_string(), HeaderValue::Int(nbits)),
            ("nifs".to_string(), HeaderValue::Int(1)),
            ("tstart".to_string(), HeaderValue::Double(0.0)),
            ("tsamp".to_string(), HeaderValue::Double(tsamp)),
        ];
        Ok(Self { entries })
    }

    /// Parse a header from the start of `reader`.
    ///
    /// Returns the header and the number of bytes it occupied. `path` is only
    /// used to label errors.
    pub fn read_from<R: Read>(reader: &mut R, path: &Path) -> Result<(Self, u64), SearchError> {
        let mut consumed = 0u64;
        let magic = read_string(reader, &mut consumed, path)?;
        if magic != HEADER_START {
            return Err(SearchError::format(path, "file does not start with HEADER_START"));
        }

        let mut entries = Vec::new();
        loop {
            let keyword = read_string(reader, &mut consumed, path)?;
            if keyword == HEADER_END {
                break;
            }
            let kind = keyword_kind(&keyword).ok_or_else(|| {
                SearchError::format(path, format!("unknown header keyword `{keyword}`"))
            })?;
            let value = match kind {
                ValueKind::Int => HeaderValue::Int(i32::from_le_bytes(
                    read_array::<_, 4>(reader, &mut consumed, path)?,
                )),
                ValueKind::Double => HeaderValue::Double(f64::from_le_bytes(
                    read_array::<_, 8>(reader, &mut consumed, path)?,
                )),
                ValueKind::Str => HeaderValue::Str(read_string(reader, &mut consumed, path)?),
                ValueKind::Byte => HeaderValue::Byte(read_array::<_, 1>(reader, &mut consumed, path)?[0]),
                ValueKind::Marker => HeaderValue::Marker,
            };
            entries.push((keyword, value));
        }

        let header = Self { entries };
        header.validate(path)?;
        Ok((header, consumed))
    }

    /// Check that the declared layout is one the block stream can handle.
    pub fn validate(&self, path: &Path) -> Result<(), SearchError> {
        let nchans = self.int("nchans").unwrap_or(0);
        if nchans <= 0 {
            return Err(SearchError::format(path, format!("invalid nchans={nchans}")));
        }
        let nbits = self.int("nbits").unwrap_or(0);
        if nbits <= 0 || !SUPPORTED_NBITS.contains(&(nbits as u32)) {
            return Err(SearchError::format(
                path,
                format!("unsupported nbits={nbits} with nchans={nchans}"),
            ));
        }
        let nifs = self.int("nifs").unwrap_or(1);
        if nifs != 1 {
            return Err(SearchError::format(path, format!("unsupported nifs={nifs}")));
        }
        match self.double("tsamp") {
            Some(t) if t > 0.0 && t.is_finite() => Ok(()),
            other => Err(SearchError::format(path, format!("invalid tsamp={other:?}"))),
        }
    }

    /// Serialise the header exactly as it will appear on disk.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        put_string(&mut out, HEADER_START);
        for (key, value) in &self.entries {
            put_string(&mut out, key);
            value.encode_into(&mut out);
        }
        put_string(&mut out, HEADER_END);
        out
    }

    pub fn encoded_len(&self) -> usize {
        let strings = 4 + HEADER_START.len() + 4 + HEADER_END.len();
        self.entries
            .iter()
            .map(|(k, v)| {
                4 + k.len()
                    + match v {
                        HeaderValue::Int(_) => 4,
                        HeaderValue::Double(_) => 8,
                        HeaderValue::Str(s) => 4 + s.len(),
                        HeaderValue::Byte(_) => 1,
                        HeaderValue::Marker => 0,
                    }
            })
            .sum::<usize>()
            + strings
    }

    /// Byte offset of the value stored for `key` within [`Self::encode`].
    pub fn value_offset(&self, key: &str) -> Option<usize> {
        let mut offset = 4 + HEADER_START.len();
        for (k, v) in &self.entries {
            offset += 4 + k.len();
            if k == key {
                return Some(offset);
            }
            let mut scratch = Vec::new();
            v.encode_into(&mut scratch);
            offset += scratch.len();
        }
        None
    }

    /// Replace the value for `key`, appending the keyword if absent.
    pub fn set(&mut self, key: &str, value: HeaderValue) -> Result<(), SearchError> {
        match keyword_kind(key) {
            Some(kind) if kind == value.kind() => {}
            _ => {
                return Err(SearchError::Config(format!(
                    "keyword `{key}` cannot hold {value:?}"
                )))
            }
        }
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key.to_string(), value)),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn entries(&self) -> &[(String, HeaderValue)] {
        &self.entries
    }

    fn int(&self, key: &str) -> Option<i32> {
        match self.get(key) {
            Some(HeaderValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    fn double(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(HeaderValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn nchans(&self) -> usize {
        self.int("nchans").unwrap_or(0).max(0) as usize
    }

    pub fn nbits(&self) -> u32 {
        self.int("nbits").unwrap_or(0).max(0) as u32
    }

    /// Sampling interval in seconds.
    pub fn tsamp(&self) -> f64 {
        self.double("tsamp").unwrap_or(0.0)
    }

    /// Sample count recorded in the header, if the writer stored one.
    pub fn nsamples(&self) -> Option<u64> {
        self.int("nsamples").map(|n| n.max(0) as u64)
    }

    /// Bytes occupied by one spectrum (all channels at one time step).
    pub fn frame_bytes(&self) -> usize {
        self.nchans() * (self.nbits() as usize / 8)
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn read_array<R: Read, const N: usize>(
    reader: &mut R,
    consumed: &mut u64,
    path: &Path,
) -> Result<[u8; N], SearchError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, path))?;
    *consumed += N as u64;
    Ok(buf)
}

fn read_string<R: Read>(reader: &mut R, consumed: &mut u64, path: &Path) -> Result<String, SearchError> {
    let len = u32::from_le_bytes(read_array::<_, 4>(reader, consumed, path)?) as usize;
    if len > MAX_STRING_LEN {
        return Err(SearchError::format(
            path,
            format!("keyword length {len} exceeds sanity limit"),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, path))?;
    *consumed += len as u64;
    String::from_utf8(buf).map_err(|_| SearchError::format(path, "header string is not ASCII"))
}

fn truncated(err: io::Error, path: &Path) -> SearchError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        SearchError::format(path, "header is truncated")
    } else {
        SearchError::Io(err)
    }
}
