//! Container codec for STM32N6 model packages and OTA firmware images.
//!
//! Two self-describing formats are supported. Both let a device verify that a
//! blob is well-formed, untruncated and unmodified before acting on it.
//!
//! # Model Package (v2.1)
//!
//! ```text
//! +---------------------------+  0
//! | Header (60 bytes)         |
//! |  - magic: "N6M1"          |
//! |  - version, offsets/sizes |
//! |  - 4 checksums            |
//! +---------------------------+  60
//! | Metadata (JSON)           |
//! +---------------------------+
//! | Model config (JSON)       |
//! +---------------------------+
//! | Zero padding              |
//! +---------------------------+  model_offset (1 KiB aligned)
//! | Relocatable model         |
//! +---------------------------+  package_size
//! ```
//!
//! # OTA Image
//!
//! ```text
//! +---------------------------+  0
//! | OTA header (1024 bytes)   |
//! |  - magic: "OTAU"          |
//! |  - firmware info, hashes  |
//! |  - reserved regions       |
//! +---------------------------+  1024
//! | Raw firmware              |
//! +---------------------------+
//! ```

#![deny(missing_docs)]

pub mod checksum;
pub mod extract;
pub mod format;
pub mod layout;
pub mod ota;
pub mod packer;
pub mod validate;

pub use extract::{extract, extract_package, ExtractedPackage, ExtractionManifest};
pub use format::{PackageHeader, PackageMetadata, Section, SectionKind, HEADER_SIZE};
pub use layout::SectionLayout;
pub use ota::{
    build_ota_header, pack_firmware, verify_ota, verify_ota_file, FirmwareType, FirmwareVersion,
    OtaHeader, OtaImageOptions, OtaReport, OTA_HEADER_SIZE,
};
pub use packer::{create_package, BuiltPackage, PackageBuilder};
pub use validate::{validate, validate_file, ValidatedPackage};

use thiserror::Error;

/// Coarse classification of a [`PackError`].
///
/// Lets callers decide how to react to a failure without matching on
/// individual variants or their messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Truncated input, wrong magic, wrong version or wrong header size.
    Structural,
    /// A checksum or hash does not match the bytes it covers.
    Integrity,
    /// Input rejected before any bytes were written.
    Precondition,
    /// Underlying I/O failure.
    Io,
}

/// Errors that can occur during container operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input is shorter than the structure it must contain.
    #[error("truncated {what}: need {expected} bytes, got {actual}")]
    Truncated {
        /// Structure being read.
        what: &'static str,
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// Magic number does not identify the expected format.
    #[error("invalid magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic {
        /// Expected magic.
        expected: u32,
        /// Magic found in the input.
        actual: u32,
    },

    /// Format version is not the one this codec implements.
    #[error("unsupported version: expected {expected:#010x}, got {actual:#010x}")]
    UnsupportedVersion {
        /// Supported version.
        expected: u32,
        /// Version found in the input.
        actual: u32,
    },

    /// OTA header declares a size other than 1024.
    #[error("invalid header size: expected {expected}, got {actual}")]
    InvalidHeaderSize {
        /// Required header size.
        expected: usize,
        /// Declared header size.
        actual: usize,
    },

    /// Declared package size differs from the actual byte length.
    #[error("package size mismatch: header declares {declared} bytes, got {actual}")]
    PackageSizeMismatch {
        /// Size recorded in the header.
        declared: u32,
        /// Length of the input.
        actual: usize,
    },

    /// A section extends past the end of the available bytes.
    #[error("section {section} out of bounds: offset {offset} + size {size} exceeds {limit}")]
    SectionOutOfBounds {
        /// Section name.
        section: &'static str,
        /// Declared offset.
        offset: u32,
        /// Declared size.
        size: u32,
        /// Number of readable bytes.
        limit: usize,
    },

    /// CRC-32 checksum mismatch.
    #[error("{field} checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum field that failed.
        field: &'static str,
        /// Value stored in the container.
        expected: u32,
        /// Value computed from the covered bytes.
        actual: u32,
    },

    /// SHA-256 digest mismatch.
    #[error("{field} digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Digest field that failed.
        field: &'static str,
        /// Hex digest stored in the container.
        expected: String,
        /// Hex digest computed from the covered bytes.
        actual: String,
    },

    /// Relocatable model does not start with the `NBIN` magic.
    #[error("invalid relocatable model magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidModelMagic {
        /// Required model magic.
        expected: u32,
        /// Magic found in the model.
        actual: u32,
    },

    /// Model configuration is not a JSON object.
    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    /// Model configuration lacks a required top-level key.
    #[error("model config missing required field: {0}")]
    MissingConfigKey(&'static str),

    /// Firmware type tag is not recognised.
    #[error("unknown firmware type: {0}")]
    UnknownFirmwareType(String),

    /// Firmware version string is malformed.
    #[error("invalid firmware version '{0}': expected major.minor.patch.build")]
    InvalidFirmwareVersion(String),

    /// A size does not fit its 32-bit field.
    #[error("{what} too large: {size} bytes")]
    TooLarge {
        /// What overflowed.
        what: &'static str,
        /// Offending size.
        size: u64,
    },
}

impl PackError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackError::Io(_) => ErrorKind::Io,
            PackError::Truncated { .. }
            | PackError::InvalidMagic { .. }
            | PackError::UnsupportedVersion { .. }
            | PackError::InvalidHeaderSize { .. }
            | PackError::PackageSizeMismatch { .. }
            | PackError::SectionOutOfBounds { .. } => ErrorKind::Structural,
            PackError::ChecksumMismatch { .. } | PackError::DigestMismatch { .. } => {
                ErrorKind::Integrity
            }
            PackError::Json(_)
            | PackError::InvalidModelMagic { .. }
            | PackError::InvalidConfig(_)
            | PackError::MissingConfigKey(_)
            | PackError::UnknownFirmwareType(_)
            | PackError::InvalidFirmwareVersion(_)
            | PackError::TooLarge { .. } => ErrorKind::Precondition,
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, PackError>;

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::packer::{BuiltPackage, PackageBuilder};

    pub const SAMPLE_CONFIG: &[u8] =
        br#"{"model_info":{"name":"x","version":"1","type":"t"},"input_spec":{},"output_spec":{}}"#;

    pub fn builder() -> PackageBuilder {
        PackageBuilder::new().with_created_at("2025-10-15T12:00:00.000000")
    }

    pub fn sample_package(model: &[u8]) -> BuiltPackage {
        builder().build(model, SAMPLE_CONFIG).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        let err = PackError::ChecksumMismatch {
            field: "model",
            expected: 1,
            actual: 2,
        };
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let err = PackError::MissingConfigKey("input_spec");
        assert_eq!(err.kind(), ErrorKind::Precondition);

        let err = PackError::Truncated {
            what: "package header",
            expected: 60,
            actual: 3,
        };
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn test_error_message_names_field_and_values() {
        let err = PackError::ChecksumMismatch {
            field: "header",
            expected: 0xDEADBEEF,
            actual: 0x0000_0001,
        };
        assert_eq!(
            err.to_string(),
            "header checksum mismatch: expected 0xdeadbeef, got 0x00000001"
        );
    }
}
