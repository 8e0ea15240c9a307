#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Garbage must be rejected, never panic
    if let Ok(snapshot) = ipgeo::Snapshot::from_bytes(data) {
        let _ = snapshot.resolve("10.0.0.1");
        let _ = snapshot.resolve("2001:db8::1");
    }
});
