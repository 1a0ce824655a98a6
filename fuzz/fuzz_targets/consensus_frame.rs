#![no_main]
use convergentledger::wire::multicell::decode_message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Must never panic, regardless of how malformed the bytes are.
    let _ = decode_message(data);
});
