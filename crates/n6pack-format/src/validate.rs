//! Package validation.
//!
//! Checks short-circuit in a fixed order so the most specific error wins:
//!
//! 1. magic, then version (exact match)
//! 2. header checksum
//! 3. declared package size
//! 4. model checksum
//! 5. package checksum over the whole input
//!
//! The package checksum is recomputed from the raw bytes and does not rely on
//! any other field being self-consistent.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::checksum::{crc32, crc32_excluding};
use crate::format::{PackageHeader, PackageMetadata, SectionKind, PACKAGE_CHECKSUM_OFFSET};
use crate::{PackError, Result};

/// A package that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedPackage {
    /// Decoded header.
    pub header: PackageHeader,
    /// Decoded metadata, if the metadata section holds valid JSON.
    pub metadata: Option<PackageMetadata>,
    /// `model_info` from the metadata, or an empty object.
    pub model_info: serde_json::Value,
}

impl ValidatedPackage {
    /// Look up a string field of `model_info`.
    pub fn model_info_str(&self, key: &str) -> Option<&str> {
        self.model_info.get(key).and_then(|v| v.as_str())
    }
}

/// Validate a package held in memory.
pub fn validate(data: &[u8]) -> Result<ValidatedPackage> {
    let header = PackageHeader::from_bytes(data)?;
    header.check_identity()?;

    let header_checksum = header.compute_header_checksum();
    if header_checksum != header.header_checksum {
        return Err(mismatch("header", header.header_checksum, header_checksum));
    }

    if header.package_size as usize != data.len() {
        warn!(
            declared = header.package_size,
            actual = data.len(),
            "package size mismatch"
        );
        return Err(PackError::PackageSizeMismatch {
            declared: header.package_size,
            actual: data.len(),
        });
    }

    let model = header.section(SectionKind::RelocatableModel).slice(data)?;
    let model_checksum = crc32(model);
    if model_checksum != header.model_checksum {
        return Err(mismatch("model", header.model_checksum, model_checksum));
    }

    let package_checksum = crc32_excluding(data, PACKAGE_CHECKSUM_OFFSET);
    if package_checksum != header.package_checksum {
        return Err(mismatch("package", header.package_checksum, package_checksum));
    }

    let metadata = header
        .section(SectionKind::Metadata)
        .slice(data)
        .ok()
        .and_then(|bytes| PackageMetadata::from_json(bytes).ok());
    let model_info = metadata
        .as_ref()
        .map(|m| m.model_info.clone())
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

    debug!(
        package_size = header.package_size,
        model_size = header.model_size,
        metadata = metadata.is_some(),
        "package valid"
    );

    Ok(ValidatedPackage {
        header,
        metadata,
        model_info,
    })
}

/// Validate a package file.
pub fn validate_file(path: impl AsRef<Path>) -> Result<ValidatedPackage> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    debug!(path = %path.display(), size = data.len(), "validating package");
    validate(&data)
}

fn mismatch(field: &'static str, expected: u32, actual: u32) -> PackError {
    warn!(
        field,
        expected = format_args!("{:#010x}", expected),
        actual = format_args!("{:#010x}", actual),
        "checksum mismatch"
    );
    PackError::ChecksumMismatch {
        field,
        expected,
        actual,
    }
}
