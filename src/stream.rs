//! Block-wise filterbank reader and writer.
//!
//! Files are processed in fixed-size blocks of time samples so peak memory
//! is `nchans * block_size` regardless of file length. The final block of a
//! file is whatever remains (`total % block_size`) and is returned as a
//! shorter block, never padded.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::block::SpectralBlock;
use crate::context::RunContext;
use crate::header::SpectralHeader;
use crate::zap::ZapSpec;
use crate::SearchError;

/// Default number of time samples per block.
pub const DEFAULT_BLOCK_SAMPLES: u64 = 1_000_000;

/// Sequential reader over a filterbank file.
pub struct SpectralReader {
    path: PathBuf,
    header: SpectralHeader,
    file: BufReader<File>,
    data_offset: u64,
    total_samples: u64,
}

impl SpectralReader {
    /// Open `path` and parse its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let mut file = BufReader::new(file);
        let (header, data_offset) = SpectralHeader::read_from(&mut file, &path)?;

        let frame = header.frame_bytes() as u64;
        let data_len = file_len.saturating_sub(data_offset);
        if data_len % frame != 0 {
            return Err(SearchError::format(
                &path,
                format!("{data_len} data bytes is not a whole number of {frame}-byte spectra"),
            ));
        }

        Ok(Self {
            path,
            header,
            file,
            data_offset,
            total_samples: data_len / frame,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &SpectralHeader {
        &self.header
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Number of `block_size` reads needed to cover the file.
    pub fn block_count(&self, block_size: u64) -> u64 {
        if block_size == 0 {
            return 0;
        }
        self.total_samples.div_ceil(block_size)
    }

    /// Read up to `count` samples starting at `start`.
    ///
    /// A request that starts at or beyond the end of the data is a range
    /// error; one that overhangs the end is truncated.
    pub fn read_block(&mut self, start: u64, count: u64) -> Result<SpectralBlock, SearchError> {
        if start >= self.total_samples || count == 0 {
            return Err(SearchError::Range(format!(
                "samples {start}..{} requested from {} holding {} samples",
                start.saturating_add(count),
                self.path.display(),
                self.total_samples
            )));
        }
        let n = count.min(self.total_samples - start);
        let frame = self.header.frame_bytes() as u64;

        self.file.seek(SeekFrom::Start(self.data_offset + start * frame))?;
        let mut bytes = vec![0u8; (n * frame) as usize];
        self.file.read_exact(&mut bytes)?;
        SpectralBlock::decode(&bytes, self.header.nchans(), self.header.nbits(), start)
    }

    /// Iterate over the whole file in blocks of `block_size` samples.
    pub fn blocks(&mut self, block_size: u64) -> Blocks<'_> {
        Blocks {
            reader: self,
            next: 0,
            block_size,
        }
    }
}

pub struct Blocks<'a> {
    reader: &'a mut SpectralReader,
    next: u64,
    block_size: u64,
}

impl Iterator for Blocks<'_> {
    type Item = Result<SpectralBlock, SearchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.block_size == 0 || self.next >= self.reader.total_samples {
            return None;
        }
        let result = self.reader.read_block(self.next, self.block_size);
        self.next += self.block_size;
        Some(result)
    }
}

/// Writer that only materialises its destination on [`SpectralWriter::finish`].
///
/// Data goes to a temporary file beside the destination; dropping an
/// unfinished writer removes it.
pub struct SpectralWriter {
    dest: PathBuf,
    header: SpectralHeader,
    out: BufWriter<NamedTempFile>,
    next_sample: Option<u64>,
    written: u64,
    poisoned: bool,
    scratch: Vec<u8>,
}

impl SpectralWriter {
    /// Start a new file at `dest`, writing `header` first.
    pub fn create<P: AsRef<Path>>(dest: P, header: &SpectralHeader) -> Result<Self, SearchError> {
        let dest = dest.as_ref().to_path_buf();
        header.validate(&dest)?;
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = NamedTempFile::new_in(dir)?;
        let mut out = BufWriter::new(tmp);
        out.write_all(&header.encode())?;
        Ok(Self {
            dest,
            header: header.clone(),
            out,
            next_sample: None,
            written: 0,
            poisoned: false,
            scratch: Vec::new(),
        })
    }

    pub fn header(&self) -> &SpectralHeader {
        &self.header
    }

    pub fn samples_written(&self) -> u64 {
        self.written
    }

    /// Append the next block in time order.
    ///
    /// The first block may start anywhere; each later block must start where
    /// the previous one ended.
    pub fn append_block(&mut self, block: &SpectralBlock) -> Result<(), SearchError> {
        if self.poisoned {
            return Err(SearchError::State(format!(
                "{} failed earlier and accepts no more blocks",
                self.dest.display()
            )));
        }
        if block.nchans() != self.header.nchans() || block.nbits() != self.header.nbits() {
            return Err(SearchError::State(format!(
                "block of {} channels x {} bits does not match header ({} x {})",
                block.nchans(),
                block.nbits(),
                self.header.nchans(),
                self.header.nbits()
            )));
        }
        if let Some(expected) = self.next_sample {
            if block.start_sample() != expected {
                return Err(SearchError::State(format!(
                    "block starts at sample {} but the stream is at {expected}",
                    block.start_sample()
                )));
            }
        }

        self.scratch.clear();
        block.encode_into(&mut self.scratch);
        if let Err(e) = self.out.write_all(&self.scratch) {
            self.poisoned = true;
            return Err(e.into());
        }
        self.next_sample = Some(block.end_sample());
        self.written += block.nsamples() as u64;
        Ok(())
    }

    /// Flush, patch `nsamples` if the header carries it, and move the file
    /// into place.
    pub fn finish(self) -> Result<PathBuf, SearchError> {
        if self.poisoned {
            return Err(SearchError::State(format!(
                "refusing to finalise {} after a failed write",
                self.dest.display()
            )));
        }
        let mut tmp = self.out.into_inner().map_err(|e| e.into_error())?;
        if self.header.nsamples().is_some() {
            if let Some(offset) = self.header.value_offset("nsamples") {
                tmp.seek(SeekFrom::Start(offset as u64))?;
                tmp.write_all(&nsamples_field(self.written)?.to_le_bytes())?;
            }
        }
        tmp.flush()?;
        tmp.persist(&self.dest).map_err(|e| SearchError::Io(e.error))?;
        Ok(self.dest)
    }
}

/// The header stores the sample count as an `i32`.
fn nsamples_field(written: u64) -> Result<i32, SearchError> {
    i32::try_from(written)
        .map_err(|_| SearchError::State(format!("{written} samples do not fit the nsamples field")))
}

/// Copy `src` to `dst` block by block, zeroing the channels in `spec`.
///
/// Returns the number of samples written.
pub fn zap_file(
    ctx: &RunContext,
    src: &Path,
    dst: &Path,
    spec: &ZapSpec,
    block_size: u64,
) -> Result<u64, SearchError> {
    if block_size == 0 {
        return Err(SearchError::Config("block size must be non-zero".into()));
    }
    let mut reader = SpectralReader::open(src)?;
    spec.check(reader.header().nchans())?;
    let mut writer = SpectralWriter::create(dst, reader.header())?;

    let bar = ctx.progress_bar(reader.block_count(block_size), "zapping");
    for block in reader.blocks(block_size) {
        let mut block = block?;
        block.zap(spec)?;
        writer.append_block(&block)?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    let written = writer.samples_written();
    writer.finish()?;
    log::info!(
        "[{}] zapped `{}` in {} -> {} ({written} samples)",
        ctx.tag(),
        spec,
        src.display(),
        dst.display()
    );
    Ok(written)
}

/// Cut `length` samples starting at `start` out of `src` into a new file.
pub fn copy_range(
    ctx: &RunContext,
    src: &Path,
    dst: &Path,
    start: u64,
    length: u64,
    block_size: u64,
) -> Result<u64, SearchError> {
    let mut reader = SpectralReader::open(src)?;
    let end = start.checked_add(length).filter(|&e| e <= reader.total_samples()).ok_or_else(|| {
        SearchError::Range(format!(
            "snippet {start}+{length} overruns {} ({} samples)",
            src.display(),
            reader.total_samples()
        ))
    })?;
    if block_size == 0 {
        return Err(SearchError::Config("block size must be non-zero".into()));
    }

    let mut writer = SpectralWriter::create(dst, reader.header())?;
    let mut at = start;
    while at < end {
        let block = reader.read_block(at, block_size.min(end - at))?;
        writer.append_block(&block)?;
        at = block.end_sample();
    }
    let written = writer.samples_written();
    writer.finish()?;
    log::debug!("[{}] cut {start}+{length} from {} into {}", ctx.tag(), src.display(), dst.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nsamples_field_range() {
        assert_eq!(nsamples_field(0).unwrap(), 0);
        assert_eq!(nsamples_field(i32::MAX as u64).unwrap(), i32::MAX);
        assert!(matches!(nsamples_field(i32::MAX as u64 + 1), Err(SearchError::State(_))));
    }
}
