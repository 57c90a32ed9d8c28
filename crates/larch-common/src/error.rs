//! Error types for Larch.

use thiserror::Error;

/// Result type alias using LarchError.
pub type Result<T> = std::result::Result<T, LarchError>;

/// Errors that can occur in Larch operations.
#[derive(Debug, Error)]
pub enum LarchError {
    // I/O and paged-file errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    // Buffer pool errors
    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // Heap file errors
    #[error("Page full, unable to insert record")]
    PageFull,

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("End of file reached")]
    EndOfFile,

    // Index errors
    #[error("Existing index metadata does not match: {0}")]
    BadIndexInfo(String),

    #[error("Invalid scan operator for its position")]
    BadOpcodes,

    #[error("Scan range low bound exceeds high bound")]
    BadScanrange,

    #[error("No key in the scan range")]
    NoSuchKeyFound,

    #[error("No scan in progress")]
    ScanNotInitialized,

    #[error("Scan completed")]
    IndexScanCompleted,

    #[error("Unsupported attribute type: {0}")]
    UnsupportedType(String),

    #[error("Storage corrupted: {0}")]
    Corrupted(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: LarchError = io_err.into();
        assert!(matches!(err, LarchError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_file_errors_display() {
        let err = LarchError::FileNotFound("relA.0".to_string());
        assert_eq!(err.to_string(), "File not found: relA.0");

        let err = LarchError::FileExists("relA".to_string());
        assert_eq!(err.to_string(), "File already exists: relA");

        let err = LarchError::PageNotFound("page 9 of file 2".to_string());
        assert_eq!(err.to_string(), "Page not found: page 9 of file 2");
    }

    #[test]
    fn test_buffer_pool_full_display() {
        let err = LarchError::BufferPoolFull;
        assert_eq!(err.to_string(), "Buffer pool full, unable to allocate frame");
    }

    #[test]
    fn test_heap_errors_display() {
        assert_eq!(
            LarchError::PageFull.to_string(),
            "Page full, unable to insert record"
        );
        assert_eq!(LarchError::EndOfFile.to_string(), "End of file reached");
    }

    #[test]
    fn test_scan_errors_display() {
        assert_eq!(
            LarchError::BadOpcodes.to_string(),
            "Invalid scan operator for its position"
        );
        assert_eq!(
            LarchError::BadScanrange.to_string(),
            "Scan range low bound exceeds high bound"
        );
        assert_eq!(
            LarchError::NoSuchKeyFound.to_string(),
            "No key in the scan range"
        );
        assert_eq!(
            LarchError::ScanNotInitialized.to_string(),
            "No scan in progress"
        );
        assert_eq!(LarchError::IndexScanCompleted.to_string(), "Scan completed");
    }

    #[test]
    fn test_bad_index_info_display() {
        let err = LarchError::BadIndexInfo("attribute offset 0 != 8".to_string());
        assert_eq!(
            err.to_string(),
            "Existing index metadata does not match: attribute offset 0 != 8"
        );
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(LarchError::BadOpcodes)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LarchError>();
    }
}
