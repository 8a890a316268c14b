//! In-memory slab of a filterbank file: every channel over a run of samples.
//!
//! Files store spectra time-major; a [`SpectralBlock`] holds the same samples
//! channel-major (row = channel, column = time) so a whole channel can be
//! zeroed or inspected as one row.

use std::fmt::Debug;

use bytemuck::{Pod, Zeroable};
use ndarray::Array2;

use crate::zap::ZapSpec;
use crate::SearchError;

/// Fixed-width sample type stored in a filterbank file.
pub trait Sample: Pod + PartialEq + Debug {
    const NBITS: u32;
    const BYTES: usize = (Self::NBITS / 8) as usize;

    /// Decode one little-endian sample from exactly `Self::BYTES` bytes.
    fn from_le(bytes: &[u8]) -> Self;
    fn put_le(self, out: &mut Vec<u8>);
    fn to_f32(self) -> f32;
}

impl Sample for u8 {
    const NBITS: u32 = 8;

    fn from_le(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn put_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }

    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Sample for u16 {
    const NBITS: u32 = 16;

    fn from_le(bytes: &[u8]) -> Self {
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn put_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Sample for f32 {
    const NBITS: u32 = 32;

    fn from_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn put_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn to_f32(self) -> f32 {
        self
    }
}

/// Channel-major sample storage, one variant per supported bit width.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockData {
    U8(Array2<u8>),
    U16(Array2<u16>),
    F32(Array2<f32>),
}

macro_rules! with_array {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            BlockData::U8($arr) => $body,
            BlockData::U16($arr) => $body,
            BlockData::F32($arr) => $body,
        }
    };
}

/// A run of consecutive spectra, starting at `start_sample` of its source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralBlock {
    start_sample: u64,
    data: BlockData,
}

impl SpectralBlock {
    pub fn new(start_sample: u64, data: BlockData) -> Self {
        Self { start_sample, data }
    }

    /// Zero-filled block for the given bit width.
    pub fn zeros(nbits: u32, nchans: usize, nsamples: usize, start_sample: u64) -> Result<Self, SearchError> {
        let shape = (nchans, nsamples);
        let data = match nbits {
            8 => BlockData::U8(Array2::zeros(shape)),
            16 => BlockData::U16(Array2::zeros(shape)),
            32 => BlockData::F32(Array2::zeros(shape)),
            other => return Err(SearchError::Config(format!("unsupported nbits={other}"))),
        };
        Ok(Self::new(start_sample, data))
    }

    /// Build a block from time-major file bytes.
    pub fn decode(bytes: &[u8], nchans: usize, nbits: u32, start_sample: u64) -> Result<Self, SearchError> {
        let data = match nbits {
            8 => BlockData::U8(decode_array(bytes, nchans)?),
            16 => BlockData::U16(decode_array(bytes, nchans)?),
            32 => BlockData::F32(decode_array(bytes, nchans)?),
            other => return Err(SearchError::Config(format!("unsupported nbits={other}"))),
        };
        Ok(Self::new(start_sample, data))
    }

    /// Append the block to `out` in time-major file order.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        with_array!(&self.data, arr => {
            out.reserve(arr.len() * (self.nbits() as usize / 8));
            for &v in arr.t().iter() {
                v.put_le(out);
            }
        })
    }

    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    /// One past the last sample held.
    pub fn end_sample(&self) -> u64 {
        self.start_sample + self.nsamples() as u64
    }

    pub fn nchans(&self) -> usize {
        with_array!(&self.data, arr => arr.nrows())
    }

    pub fn nsamples(&self) -> usize {
        with_array!(&self.data, arr => arr.ncols())
    }

    pub fn nbits(&self) -> u32 {
        match self.data {
            BlockData::U8(_) => u8::NBITS,
            BlockData::U16(_) => u16::NBITS,
            BlockData::F32(_) => f32::NBITS,
        }
    }

    pub fn channel_f32(&self, channel: usize) -> Option<Vec<f32>> {
        if channel >= self.nchans() {
            return None;
        }
        Some(with_array!(&self.data, arr => arr.row(channel).iter().map(|&v| v.to_f32()).collect()))
    }

    /// Zero a single channel row. Out-of-range channels are a config error.
    pub fn zero_channel(&mut self, channel: usize) -> Result<(), SearchError> {
        let nchans = self.nchans();
        if channel >= nchans {
            return Err(SearchError::Config(format!(
                "channel {channel} out of range for {nchans} channels"
            )));
        }
        with_array!(&mut self.data, arr => arr.row_mut(channel).fill(Zeroable::zeroed()));
        Ok(())
    }

    /// Zero every channel named by `spec` (index 0 = top of the band).
    ///
    /// The whole spec is range-checked before any row is touched.
    pub fn zap(&mut self, spec: &ZapSpec) -> Result<(), SearchError> {
        spec.check(self.nchans())?;
        for ch in spec.channels() {
            self.zero_channel(ch.index() as usize)?;
        }
        Ok(())
    }
}

fn decode_array<T: Sample>(bytes: &[u8], nchans: usize) -> Result<Array2<T>, SearchError> {
    let frame = nchans * T::BYTES;
    if nchans == 0 || bytes.len() % frame != 0 {
        return Err(SearchError::Range(format!(
            "{} bytes is not a whole number of {}-byte spectra",
            bytes.len(),
            frame
        )));
    }
    let nsamples = bytes.len() / frame;
    let values: Vec<T> = bytes.chunks_exact(T::BYTES).map(T::from_le).collect();
    let time_major = Array2::from_shape_vec((nsamples, nchans), values)
        .map_err(|e| SearchError::Range(format!("block shape: {e}")))?;
    Ok(time_major.reversed_axes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(frames: &[[u16; 3]]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|f| f.iter().flat_map(|v| v.to_le_bytes()))
            .collect()
    }

    #[test]
    fn decode_is_channel_major() {
        let bytes = frame_bytes(&[[1, 2, 3], [4, 5, 6]]);
        let block = SpectralBlock::decode(&bytes, 3, 16, 10).unwrap();
        assert_eq!(block.nchans(), 3);
        assert_eq!(block.nsamples(), 2);
        assert_eq!(block.end_sample(), 12);
        assert_eq!(block.channel_f32(0).unwrap(), vec![1.0, 4.0]);
        assert_eq!(block.channel_f32(2).unwrap(), vec![3.0, 6.0]);
        let mut out = Vec::new();
        block.encode_into(&mut out);
        assert_eq!(out, bytes);
    }

    #[test]
    fn partial_spectrum_rejected() {
        let err = SpectralBlock::decode(&[0u8; 5], 2, 16, 0).unwrap_err();
        assert!(matches!(err, SearchError::Range(_)));
    }

    #[test]
    fn zero_channel_only_touches_row() {
        let bytes: Vec<u8> = (1u8..=8).collect();
        let mut block = SpectralBlock::decode(&bytes, 4, 8, 0).unwrap();
        block.zero_channel(1).unwrap();
        assert_eq!(block.channel_f32(1).unwrap(), vec![0.0, 0.0]);
        assert_eq!(block.channel_f32(0).unwrap(), vec![1.0, 5.0]);
        assert!(block.zero_channel(4).is_err());
    }

    #[test]
    fn zap_out_of_range_leaves_block_untouched() {
        let bytes: Vec<u8> = (1u8..=8).collect();
        let mut block = SpectralBlock::decode(&bytes, 4, 8, 0).unwrap();
        let before = block.clone();
        let spec: ZapSpec = "0,2:9".parse().unwrap();
        assert!(matches!(block.zap(&spec), Err(SearchError::Config(_))));
        assert_eq!(block, before);
    }
}
