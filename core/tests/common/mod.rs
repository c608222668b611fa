//! Shared test utilities for sdlink core integration tests.
//!
//! Provides a populated simulated card and a fixed download timestamp.

// Each integration test is compiled as its own crate, so not every test file
// uses every function from this shared module. Suppress dead_code warnings.
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use sdlink_core::sim::SimulatedCard;
use sdlink_core::SdSession;

/// Contents of the sample data log.
pub const DATA_CSV: &[u8] = b"time,ain0,ain1\n0.0,1.25,0.50\n0.1,1.26,0.49\n";

/// A card laid out like a logging device in the field.
pub fn logger_card() -> SimulatedCard {
    SimulatedCard::new()
        .with_file("/logs/2024-01/data.csv", DATA_CSV)
        .with_file("/logs/2024-02/data.csv", b"time,ain0\n")
        .with_file("/logs/notes.txt", b"calibrated 2024-01-03")
        .with_file("/config.json", br#"{"rate": 10}"#)
        .with_entry("/SDCARD", 0x08)
        .with_geometry(512, 8, 1_000_000, 250_000)
}

/// Session over [`logger_card`] for the given device identifier.
pub fn logger_session(identifier: &str) -> SdSession<SimulatedCard> {
    SdSession::new(identifier, logger_card())
}

/// 2024-03-15 08:30:00.
pub fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .expect("valid date")
        .and_hms_opt(8, 30, 0)
        .expect("valid time")
}
