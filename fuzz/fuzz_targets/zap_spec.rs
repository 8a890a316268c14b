use bbsearch::ZapSpec;
use honggfuzz::fuzz;

fn main() {
    loop {
        fuzz!(|data: &[u8]| {
            let Ok(text) = std::str::from_utf8(data) else {
                return;
            };
            if let Ok(spec) = ZapSpec::parse(text) {
                let again = ZapSpec::parse(&spec.to_string()).expect("display output must parse");
                assert_eq!(spec, again);
            }
        });
    }
}
