#![no_main]
use convergentledger::core::cell::value::Value;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Value::decode(data, 0);
});
