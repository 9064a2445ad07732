//! Device error decoding tests for go2link core

use go2link_core::{classify, decode_error_report, DeviceErrorRecord};
use serde_json::json;

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_unknown_code_falls_back_to_source_and_code() {
    let record = DeviceErrorRecord::new(1_700_000_000, 201, 0x99);
    let c = classify(&record);

    assert_eq!(c.source, 200);
    assert_eq!(c.code_text, "200-99");
    assert!(!c.critical);
}

#[test]
fn test_known_code_uses_table_text() {
    let record = DeviceErrorRecord::new(0, 300, 0x4);
    let c = classify(&record);

    assert_eq!(c.source_text, "Motor malfunction");
    assert_eq!(c.code_text, "Driver overheating");
}

#[test]
fn test_stability_code_is_critical_regardless_of_source() {
    let record = DeviceErrorRecord::new(0, 1, 0x67924D46);
    let c = classify(&record);

    assert!(c.critical);
    assert_eq!(c.source, 900, "large codes map to the complex category");
    assert_eq!(c.source_text, "Complex error");
}

#[test]
fn test_unknown_source_text_is_numeric() {
    let record = DeviceErrorRecord::new(0, 1234, 0x1);
    let c = classify(&record);

    assert_eq!(c.source_text, "1200");
    assert_eq!(c.code_text, "1200-1");
}

#[test]
fn test_code_lookup_is_hex() {
    // 16 decimal is 0x10, which the table knows for source 100
    let c = classify(&DeviceErrorRecord::new(0, 100, 16));
    assert_eq!(c.code_text, "Battery communication error");
    assert!(c.critical);
}

#[test]
fn test_display_mentions_severity() {
    let c = classify(&DeviceErrorRecord::new(0, 100, 0x135));
    assert!(c.to_string().starts_with("CRITICAL"));

    let c = classify(&DeviceErrorRecord::new(0, 100, 0x1));
    assert!(c.to_string().starts_with("error"));
}

// ============================================================================
// Report decoding
// ============================================================================

#[test]
fn test_decode_list_of_triples() {
    let data = json!([[1_700_000_000, 100, 1], [1_700_000_001, 300, 4]]);
    let records: Vec<_> = decode_error_report(&data)
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("all entries valid");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0], DeviceErrorRecord::new(1_700_000_000, 100, 1));
    assert_eq!(records[1].source, 300);
}

#[test]
fn test_decode_bare_code() {
    let results = decode_error_report(&json!(16));
    assert_eq!(results.len(), 1);

    let record = results[0].as_ref().expect("bare code is valid");
    assert_eq!(record.source, 0);
    assert_eq!(record.code, 16);
    assert!(record.timestamp > 0);
}

#[test]
fn test_decode_malformed_entry_does_not_hide_others() {
    let data = json!([[1, 100, 1], "garbage", [1, 2], [1, -5, 3]]);
    let results = decode_error_report(&data);

    assert_eq!(results.len(), 4);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_err());
    assert!(results[3].is_err());
}

#[test]
fn test_decode_rejects_fractional_numbers() {
    let data = json!([[1_700_000_000, 300, 1.5], [1_700_000_000.5, 300, 4], 16.9]);
    let results = decode_error_report(&data);

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(Result::is_err));
    assert!(decode_error_report(&json!(2.0))[0].is_err());
}

#[test]
fn test_decode_never_panics_on_odd_input() {
    for data in [json!(null), json!({}), json!("x"), json!([]), json!(-1)] {
        for result in decode_error_report(&data) {
            assert!(result.is_err());
        }
    }
}
