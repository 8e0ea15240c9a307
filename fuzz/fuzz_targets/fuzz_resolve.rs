#![no_main]
use ipgeo::source::IterSource;
use ipgeo::{BuildOptions, Resolver};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let resolver = Resolver::new();
        let rows = IterSource::new(vec![
            vec![("cidr", "1.2.3.4")],
            vec![("cidr", "10.0.0.0/8")],
            vec![("cidr", "192.168.0.0/16")],
            vec![("cidr", "2001:db8::/32")],
            vec![("cidr", "0.0.0.0/0")],
        ]);
        if resolver.rebuild(&rows, BuildOptions::default()).is_ok() {
            let _ = resolver.resolve(s);
            let _ = ipgeo::api::lookup_envelope(&resolver, s);
        }
    }
});
