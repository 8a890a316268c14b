use std::fs;
use std::path::{Path, PathBuf};

use bbsearch::{
    zap_file, HeaderValue, RunContext, SearchError, SpectralBlock, SpectralHeader, SpectralReader, SpectralWriter,
    ZapSpec,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn sample_bytes(nbits: u32, count: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    for _ in 0..count {
        match nbits {
            8 => out.push(rng.gen::<u8>()),
            16 => out.extend_from_slice(&rng.gen::<u16>().to_le_bytes()),
            _ => out.extend_from_slice(&rng.gen_range(-1.0e3f32..1.0e3).to_le_bytes()),
        }
    }
    out
}

fn write_fil(dir: &Path, name: &str, header: &SpectralHeader, nsamples: usize, seed: u64) -> PathBuf {
    let path = dir.join(name);
    let mut bytes = header.encode();
    bytes.extend(sample_bytes(header.nbits(), nsamples * header.nchans(), seed));
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn roundtrip_is_byte_exact() {
    let dir = tempfile::tempdir().unwrap();
    for nbits in [8, 16, 32] {
        let mut header = SpectralHeader::new(12, nbits, 6.4e-5, 8450.0, -0.5).unwrap();
        header.set("source_name", HeaderValue::Str("J0534+2200".into())).unwrap();
        header.set("nsamples", HeaderValue::Int(103)).unwrap();
        let src = write_fil(dir.path(), &format!("in{nbits}.fil"), &header, 103, nbits as u64);
        let dst = dir.path().join(format!("out{nbits}.fil"));

        let mut reader = SpectralReader::open(&src).unwrap();
        assert_eq!(reader.total_samples(), 103);
        let mut writer = SpectralWriter::create(&dst, reader.header()).unwrap();
        for block in reader.blocks(10) {
            writer.append_block(&block.unwrap()).unwrap();
        }
        writer.finish().unwrap();

        assert_eq!(fs::read(&src).unwrap(), fs::read(&dst).unwrap(), "nbits={nbits}");
    }
}

#[test]
fn last_block_is_short() {
    let dir = tempfile::tempdir().unwrap();
    let header = SpectralHeader::new(4, 8, 1e-3, 1400.0, -1.0).unwrap();
    let src = write_fil(dir.path(), "a.fil", &header, 25, 1);
    let mut reader = SpectralReader::open(&src).unwrap();
    assert_eq!(reader.block_count(10), 3);
    let sizes: Vec<usize> = reader.blocks(10).map(|b| b.unwrap().nsamples()).collect();
    assert_eq!(sizes, [10, 10, 5]);
}

#[test]
fn reading_past_end_is_range_error() {
    let dir = tempfile::tempdir().unwrap();
    let header = SpectralHeader::new(4, 16, 1e-3, 1400.0, -1.0).unwrap();
    let src = write_fil(dir.path(), "a.fil", &header, 25, 2);
    let mut reader = SpectralReader::open(&src).unwrap();
    assert!(matches!(reader.read_block(25, 1), Err(SearchError::Range(_))));
    assert!(matches!(reader.read_block(0, 0), Err(SearchError::Range(_))));
    assert_eq!(reader.read_block(20, 100).unwrap().nsamples(), 5);
}

#[test]
fn bad_files_are_format_errors() {
    let dir = tempfile::tempdir().unwrap();

    let header = SpectralHeader::new(4, 4, 1e-3, 1400.0, -1.0).unwrap();
    let path = dir.path().join("nbits4.fil");
    fs::write(&path, header.encode()).unwrap();
    assert!(matches!(SpectralReader::open(&path), Err(SearchError::Format { .. })));

    let header = SpectralHeader::new(4, 8, 1e-3, 1400.0, -1.0).unwrap();
    let mut bytes = header.encode();
    bytes.extend([0u8; 4 * 3 + 1]);
    let path = dir.path().join("partial.fil");
    fs::write(&path, bytes).unwrap();
    let err = SpectralReader::open(&path).err().unwrap();
    assert!(err.to_string().contains("whole number"));

    let path = dir.path().join("garbage.fil");
    fs::write(&path, b"not a filterbank").unwrap();
    assert!(matches!(SpectralReader::open(&path), Err(SearchError::Format { .. })));
}

#[test]
fn writer_rejects_out_of_order_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let header = SpectralHeader::new(3, 8, 1e-3, 1400.0, -1.0).unwrap();
    let mut writer = SpectralWriter::create(dir.path().join("o.fil"), &header).unwrap();
    writer.append_block(&SpectralBlock::zeros(8, 3, 5, 0).unwrap()).unwrap();

    let gap = SpectralBlock::zeros(8, 3, 5, 10).unwrap();
    assert!(matches!(writer.append_block(&gap), Err(SearchError::State(_))));
    let again = SpectralBlock::zeros(8, 3, 5, 0).unwrap();
    assert!(matches!(writer.append_block(&again), Err(SearchError::State(_))));

    writer.append_block(&SpectralBlock::zeros(8, 3, 5, 5).unwrap()).unwrap();
    assert_eq!(writer.samples_written(), 10);
}

#[test]
fn writer_rejects_mismatched_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let header = SpectralHeader::new(3, 8, 1e-3, 1400.0, -1.0).unwrap();
    let mut writer = SpectralWriter::create(dir.path().join("o.fil"), &header).unwrap();
    let wide = SpectralBlock::zeros(8, 4, 5, 0).unwrap();
    assert!(matches!(writer.append_block(&wide), Err(SearchError::State(_))));
    let deep = SpectralBlock::zeros(32, 3, 5, 0).unwrap();
    assert!(matches!(writer.append_block(&deep), Err(SearchError::State(_))));
}

#[test]
fn unfinished_writer_leaves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("o.fil");
    let header = SpectralHeader::new(3, 8, 1e-3, 1400.0, -1.0).unwrap();
    {
        let mut writer = SpectralWriter::create(&dest, &header).unwrap();
        writer.append_block(&SpectralBlock::zeros(8, 3, 5, 0).unwrap()).unwrap();
    }
    assert!(!dest.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn finish_patches_nsamples() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("o.fil");
    let mut header = SpectralHeader::new(2, 16, 1e-3, 1400.0, -1.0).unwrap();
    header.set("nsamples", HeaderValue::Int(0)).unwrap();
    let mut writer = SpectralWriter::create(&dest, &header).unwrap();
    writer.append_block(&SpectralBlock::zeros(16, 2, 7, 100).unwrap()).unwrap();
    writer.append_block(&SpectralBlock::zeros(16, 2, 5, 107).unwrap()).unwrap();
    writer.finish().unwrap();

    let reader = SpectralReader::open(&dest).unwrap();
    assert_eq!(reader.header().nsamples(), Some(12));
    assert_eq!(reader.total_samples(), 12);
}

#[test]
fn zap_with_zero_block_size_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let header = SpectralHeader::new(4, 8, 1e-3, 1400.0, -1.0).unwrap();
    let src = write_fil(dir.path(), "a.fil", &header, 20, 3);
    let dst = dir.path().join("a_zapped.fil");
    let spec = ZapSpec::parse("0:1").unwrap();
    let err = zap_file(&RunContext::quiet("test"), &src, &dst, &spec, 0).unwrap_err();
    assert!(matches!(err, SearchError::Config(_)));
    assert!(!dst.exists());
}

proptest! {
    #[test]
    fn block_size_does_not_change_data(
        nsamples in 1usize..200,
        block in 1u64..64,
        nchans in 1usize..9,
        width in 0usize..3,
        seed in any::<u64>(),
    ) {
        let nbits = [8u32, 16, 32][width];
        let dir = tempfile::tempdir().unwrap();
        let header = SpectralHeader::new(nchans, nbits, 1e-3, 1400.0, -1.0).unwrap();
        let src = write_fil(dir.path(), "p.fil", &header, nsamples, seed);
        let mut reader = SpectralReader::open(&src).unwrap();

        let mut whole = Vec::new();
        reader.read_block(0, nsamples as u64).unwrap().encode_into(&mut whole);

        let mut pieces = Vec::new();
        let mut calls = 0u64;
        for b in reader.blocks(block) {
            b.unwrap().encode_into(&mut pieces);
            calls += 1;
        }
        prop_assert_eq!(calls, (nsamples as u64).div_ceil(block));
        prop_assert_eq!(whole, pieces);
    }
}
