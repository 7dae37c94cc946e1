#![no_main]

use cardlog::extract::PhaseExtractor;
use cardlog::scanner::LineScanner;
use cardlog::variant::Variant;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a log: must terminate and never panic
    let variant = Variant::fixed_disclosure();
    if let Ok(extractor) = PhaseExtractor::new(&variant) {
        let mut scanner = LineScanner::new(Cursor::new(data));
        let _ = extractor.extract(&mut scanner);
    }
});
