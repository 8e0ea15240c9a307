#![no_main]
use ipgeo::source::CsvSource;
use ipgeo::{BuildOptions, SnapshotBuilder};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let Ok(rows) = CsvSource::rows_from_reader(Cursor::new(data.to_vec())) else {
        return;
    };
    let mut builder = SnapshotBuilder::new(BuildOptions::default());
    for row in rows.flatten() {
        let _ = builder.add_row(&row);
    }
    if let Ok((snapshot, _)) = builder.finish() {
        let _ = snapshot.to_bytes();
    }
});
