//! Tests for error types

use ocean_qc::Error;

#[test]
fn test_shape_mismatch_error() {
    let error = Error::ShapeMismatch {
        expected: 10,
        actual: 9,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Shape mismatch"));
    assert!(error_str.contains("expected 10 samples, got 9"));
    assert!(error.is_fatal());
}

#[test]
fn test_fatal_error() {
    let error = Error::fatal("in_out_water", "TIME", "no sample in water");
    let error_str = format!("{error}");
    assert!(error_str.contains("Fatal QC failure"));
    assert!(error_str.contains("in_out_water"));
    assert!(error_str.contains("no sample in water"));
    assert_eq!(error.location(), Some(("in_out_water", "TIME")));
}

#[test]
fn test_test_failed_error() {
    let error = Error::TestFailed {
        test: "regional_range".to_string(),
        variable: "PSAL".to_string(),
        source: Box::new(Error::Config("PSAL_min set without PSAL_max".to_string())),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Test regional_range failed on PSAL"));
    assert!(error_str.contains("PSAL_min set without PSAL_max"));
    assert!(!error.is_fatal());
    assert!(std::error::Error::source(&error).is_some());
}

#[test]
fn test_storage_error() {
    let error = Error::StorageError("file not found".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("file not found"));
    assert!(!error.is_fatal());
}

#[test]
fn test_invalid_input_error() {
    let error = Error::InvalidInput("flag index 12 out of range".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("out of range"));
}

#[test]
fn test_config_error() {
    let error = Error::Config("Unknown flag scheme: woce".to_string());
    assert!(format!("{error}").contains("Configuration error"));
    assert!(error.location().is_none());
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(!error.is_fatal());
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    assert_eq!(format!("{error}"), "custom error message");
}

#[test]
fn test_error_debug_format() {
    let error = Error::fatal("impossible_date", "TIME", "every timestamp invalid");
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("Fatal"));
}
