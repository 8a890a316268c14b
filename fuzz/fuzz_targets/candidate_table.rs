use std::io::Cursor;
use std::path::Path;

use honggfuzz::fuzz;

fn main() {
    loop {
        fuzz!(|data: &[u8]| {
            if let Ok(cands) = bbsearch::parse_candidates(Cursor::new(data), Path::new("fuzz.singlepulse")) {
                for c in &cands {
                    assert!(c.dm.is_finite() && c.snr.is_finite() && c.time.is_finite());
                }
            }
        });
    }
}
