#![no_main]

use libfuzzer_sys::fuzz_target;
use tracecall::rules::{CompiledRules, TraceFile};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing and compiling must reject bad tables with an error, never a panic
        if let Ok(file) = TraceFile::from_toml_str(input) {
            if let Ok(rules) = CompiledRules::compile(file.rules) {
                let _ = rules.resolve("__main__.main");
            }
        }
    }
});
