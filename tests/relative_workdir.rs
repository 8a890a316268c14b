//! Runs the real process runner from inside the data directory, the way the
//! search is normally launched. Kept in its own test binary because it
//! changes the process working directory.
#![cfg(unix)]

use std::env;
use std::fs;
use std::path::Path;

use bbsearch::{
    FileStage, ProcessRunner, RunContext, SearchConfig, SearchOrchestrator, SpectralHeader, ToolPaths, ToolSpec,
};

fn sh(script: &str, name: &str) -> ToolSpec {
    ToolSpec {
        program: "sh".into(),
        args: vec!["-c".into(), script.into(), name.into()],
    }
}

#[test]
fn relative_workdir_reaches_every_tool() {
    let dir = tempfile::tempdir().unwrap();
    let header = SpectralHeader::new(16, 8, 0.001, 1500.0, -1.0).unwrap();
    let mut bytes = header.encode();
    bytes.extend((0..16 * 300).map(|i| (i % 97) as u8));
    fs::write(dir.path().join("obs.fil"), bytes).unwrap();

    // Each tool exits 3 unless it can see the file it was handed from its
    // own working directory.
    let tools = ToolPaths {
        dedisperser: sh(
            r#"test -f "$2" || exit 3
printf x > "$8.dat"
printf ' Width of each time series bin (sec) = 0.001\n' > "$8.inf""#,
            "prepdata",
        ),
        detector: sh(
            r#"test -f "$1" || exit 3
printf '# DM Sigma Time Sample Downfact\n10.0 8.0 0.1 100 1\n' > "${1%.dat}.singlepulse""#,
            "single_pulse_search.py",
        ),
        extractor: sh(r#"test -f "$1" || exit 3; printf snippet"#, "extract"),
        ..ToolPaths::default()
    };
    let config = SearchConfig {
        nsub: 2,
        chans_per_sub: 8,
        edge_zap: 0,
        dm: 10.0,
        snippet_duration: 0.02,
        tools,
        ..SearchConfig::default()
    };

    let previous = env::current_dir().unwrap();
    env::set_current_dir(dir.path()).unwrap();
    let orch = SearchOrchestrator::new(config, ProcessRunner, RunContext::quiet("test"));
    let result = orch.run(Path::new("."));
    env::set_current_dir(previous).unwrap();

    let report = result.unwrap();
    let outcome = &report.files[0];
    assert_eq!(outcome.stage, FileStage::Done, "{:?}", outcome.error);
    assert_eq!(outcome.snippets.len(), 1);
    assert!(outcome.snippets[0].is_absolute());
    assert_eq!(fs::read(&outcome.snippets[0]).unwrap(), b"snippet");
    assert!(dir.path().join("cand_report.json").exists());
}
