//! Binary format definitions for model packages.
//!
//! This module defines the fixed-width package header, the sections it
//! addresses, and the metadata JSON written by the builder.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::checksum::{crc32, CHECKSUM_FIELD_SIZE};
use crate::{PackError, Result};

/// Magic number identifying a model package ("N6M1").
pub const PACKAGE_MAGIC: u32 = 0x314D_364E;

/// Current package format version (2.1.0).
pub const PACKAGE_VERSION: u32 = 0x0002_0100;

/// Dotted form of [`PACKAGE_VERSION`], written into the metadata.
pub const PACKAGE_VERSION_STRING: &str = "2.1.0";

/// Human-readable format name written into extraction manifests.
pub const PACKAGE_FORMAT_NAME: &str = "STM32N6 Model Package v2.1";

/// Magic number at the start of every relocatable model ("NBIN").
pub const RELOCATABLE_MODEL_MAGIC: u32 = 0x4E49_424E;

/// Alignment of the relocatable model section.
pub const MODEL_ALIGNMENT: u32 = 1024;

/// Number of 32-bit fields in the header.
pub const HEADER_FIELD_COUNT: usize = 15;

/// Number of trailing checksum fields.
pub const CHECKSUM_FIELD_COUNT: usize = 4;

/// Header size in bytes (fixed).
pub const HEADER_SIZE: usize = HEADER_FIELD_COUNT * 4;

/// Byte offset of `header_checksum`; the header checksum covers `[0, HEADER_CHECKSUM_OFFSET)`.
pub const HEADER_CHECKSUM_OFFSET: usize = HeaderField::HeaderChecksum.offset();

/// Byte offset of `package_checksum`; the package checksum covers the whole
/// file with only these 4 bytes zeroed.
pub const PACKAGE_CHECKSUM_OFFSET: usize = HeaderField::PackageChecksum.offset();

/// Header fields in on-disk order. Each is a little-endian `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum HeaderField {
    /// Format magic.
    Magic = 0,
    /// Format version.
    Version,
    /// Total file length.
    PackageSize,
    /// Metadata section offset.
    MetadataOffset,
    /// Metadata section size.
    MetadataSize,
    /// Model config section offset.
    ModelConfigOffset,
    /// Model config section size.
    ModelConfigSize,
    /// Relocatable model section offset.
    ModelOffset,
    /// Relocatable model section size.
    ModelSize,
    /// Extension section offset.
    ExtensionOffset,
    /// Extension section size.
    ExtensionSize,
    /// CRC-32 of the header bytes before this field.
    HeaderChecksum,
    /// CRC-32 of the relocatable model.
    ModelChecksum,
    /// CRC-32 of the model config.
    ConfigChecksum,
    /// CRC-32 of the whole file with this field zeroed.
    PackageChecksum,
}

impl HeaderField {
    /// Byte offset of this field within the header.
    pub const fn offset(self) -> usize {
        self as usize * 4
    }
}

const _: () = assert!(HeaderField::PackageChecksum.offset() + CHECKSUM_FIELD_SIZE == HEADER_SIZE);
const _: () = assert!(
    HEADER_CHECKSUM_OFFSET == (HEADER_FIELD_COUNT - CHECKSUM_FIELD_COUNT) * CHECKSUM_FIELD_SIZE
);

/// Fixed-size header at the start of a model package.
///
/// Layout (60 bytes total, all fields `u32` LE):
/// ```text
/// Offset  Field
/// 0       magic ("N6M1")
/// 4       version (0x020100)
/// 8       package_size
/// 12      metadata_offset
/// 16      metadata_size
/// 20      model_config_offset
/// 24      model_config_size
/// 28      model_offset
/// 32      model_size
/// 36      extension_offset
/// 40      extension_size
/// 44      header_checksum  - CRC32 of bytes 0..44
/// 48      model_checksum   - CRC32 of model section
/// 52      config_checksum  - CRC32 of config section
/// 56      package_checksum - CRC32 of file with bytes 56..60 zeroed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackageHeader {
    /// Format magic.
    pub magic: u32,
    /// Format version.
    pub version: u32,
    /// Total file length.
    pub package_size: u32,
    /// Metadata section offset.
    pub metadata_offset: u32,
    /// Metadata section size.
    pub metadata_size: u32,
    /// Model config section offset.
    pub model_config_offset: u32,
    /// Model config section size.
    pub model_config_size: u32,
    /// Relocatable model section offset.
    pub model_offset: u32,
    /// Relocatable model section size.
    pub model_size: u32,
    /// Extension section offset.
    pub extension_offset: u32,
    /// Extension section size.
    pub extension_size: u32,
    /// CRC-32 of the header bytes before this field.
    pub header_checksum: u32,
    /// CRC-32 of the relocatable model.
    pub model_checksum: u32,
    /// CRC-32 of the model config.
    pub config_checksum: u32,
    /// CRC-32 of the whole file with this field zeroed.
    pub package_checksum: u32,
}

impl PackageHeader {
    fn fields(&self) -> [u32; HEADER_FIELD_COUNT] {
        [
            self.magic,
            self.version,
            self.package_size,
            self.metadata_offset,
            self.metadata_size,
            self.model_config_offset,
            self.model_config_size,
            self.model_offset,
            self.model_size,
            self.extension_offset,
            self.extension_size,
            self.header_checksum,
            self.model_checksum,
            self.config_checksum,
            self.package_checksum,
        ]
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        for (chunk, value) in buf.chunks_exact_mut(4).zip(self.fields()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Deserialize header from the start of `buf`.
    ///
    /// Only the length is checked here; magic, version and checksums are the
    /// validator's concern.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(PackError::Truncated {
                what: "package header",
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let field = |f: HeaderField| read_u32_le(buf, f.offset());
        Ok(Self {
            magic: field(HeaderField::Magic),
            version: field(HeaderField::Version),
            package_size: field(HeaderField::PackageSize),
            metadata_offset: field(HeaderField::MetadataOffset),
            metadata_size: field(HeaderField::MetadataSize),
            model_config_offset: field(HeaderField::ModelConfigOffset),
            model_config_size: field(HeaderField::ModelConfigSize),
            model_offset: field(HeaderField::ModelOffset),
            model_size: field(HeaderField::ModelSize),
            extension_offset: field(HeaderField::ExtensionOffset),
            extension_size: field(HeaderField::ExtensionSize),
            header_checksum: field(HeaderField::HeaderChecksum),
            model_checksum: field(HeaderField::ModelChecksum),
            config_checksum: field(HeaderField::ConfigChecksum),
            package_checksum: field(HeaderField::PackageChecksum),
        })
    }

    /// Check magic and version.
    pub fn check_identity(&self) -> Result<()> {
        if self.magic != PACKAGE_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: PACKAGE_MAGIC,
                actual: self.magic,
            });
        }
        if self.version != PACKAGE_VERSION {
            return Err(PackError::UnsupportedVersion {
                expected: PACKAGE_VERSION,
                actual: self.version,
            });
        }
        Ok(())
    }

    /// Compute the header checksum from the current field values.
    pub fn compute_header_checksum(&self) -> u32 {
        crc32(&self.to_bytes()[..HEADER_CHECKSUM_OFFSET])
    }

    /// Dotted rendering of the version field (`major.minor.patch`).
    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            self.version >> 16,
            (self.version >> 8) & 0xFF,
            self.version & 0xFF
        )
    }

    /// Section addressed by this header.
    pub fn section(&self, kind: SectionKind) -> Section {
        let (offset, size) = match kind {
            SectionKind::Metadata => (self.metadata_offset, self.metadata_size),
            SectionKind::ModelConfig => (self.model_config_offset, self.model_config_size),
            SectionKind::RelocatableModel => (self.model_offset, self.model_size),
            SectionKind::Extension => (self.extension_offset, self.extension_size),
        };
        Section { kind, offset, size }
    }

    /// All sections in file order.
    pub fn sections(&self) -> [Section; 4] {
        SectionKind::ALL.map(|kind| self.section(kind))
    }
}

/// Read a little-endian `u32` at `offset`. Caller guarantees bounds.
pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// Logical content of a package section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Builder-generated JSON description.
    Metadata,
    /// Caller-supplied JSON config, stored verbatim.
    ModelConfig,
    /// Caller-supplied binary model, 1 KiB aligned.
    RelocatableModel,
    /// Reserved; always empty in format 2.1.
    Extension,
}

impl SectionKind {
    /// Every section kind in file order.
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Metadata,
        SectionKind::ModelConfig,
        SectionKind::RelocatableModel,
        SectionKind::Extension,
    ];

    /// Name used in manifests and error messages.
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Metadata => "metadata",
            SectionKind::ModelConfig => "model_config",
            SectionKind::RelocatableModel => "relocatable_model",
            SectionKind::Extension => "extension_data",
        }
    }

    /// File name used when the section is extracted, if it has one.
    pub fn file_name(self) -> Option<&'static str> {
        match self {
            SectionKind::Metadata => Some("metadata.json"),
            SectionKind::ModelConfig => Some("model_config.json"),
            SectionKind::RelocatableModel => Some("network_rel.bin"),
            SectionKind::Extension => None,
        }
    }
}

/// An offset/size-addressed region of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// What the section holds.
    pub kind: SectionKind,
    /// Byte offset from the start of the package.
    pub offset: u32,
    /// Length in bytes.
    pub size: u32,
}

impl Section {
    /// End offset (exclusive), widened so it cannot overflow.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }

    /// Whether the section holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Byte range of this section, checked against `limit` readable bytes.
    pub fn range(&self, limit: usize) -> Result<Range<usize>> {
        if self.end() > limit as u64 {
            return Err(PackError::SectionOutOfBounds {
                section: self.kind.name(),
                offset: self.offset,
                size: self.size,
                limit,
            });
        }
        let start = self.offset as usize;
        Ok(start..start + self.size as usize)
    }

    /// Borrow this section's bytes from `data`.
    pub fn slice<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        Ok(&data[self.range(data.len())?])
    }
}

/// Metadata JSON written at the start of every package.
///
/// Field order is alphabetical so the serialized form has sorted keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Local creation time, ISO-8601 with microseconds.
    pub created_at: String,
    /// Identity of the tool that built the package.
    pub created_by: String,
    /// `model_info` object echoed from the model config.
    pub model_info: serde_json::Value,
    /// Package format version string.
    pub package_version: String,
}

impl PackageMetadata {
    /// Serialize metadata to pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize metadata from JSON.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> PackageHeader {
        PackageHeader {
            magic: PACKAGE_MAGIC,
            version: PACKAGE_VERSION,
            package_size: 2052,
            metadata_offset: 60,
            metadata_size: 180,
            model_config_offset: 240,
            model_config_size: 90,
            model_offset: 1024,
            model_size: 1028,
            extension_offset: 2052,
            extension_size: 0,
            header_checksum: 0x1111_1111,
            model_checksum: 0x2222_2222,
            config_checksum: 0x3333_3333,
            package_checksum: 0x4444_4444,
        }
    }

    #[test]
    fn test_header_layout_constants() {
        assert_eq!(HEADER_SIZE, 60);
        assert_eq!(HEADER_CHECKSUM_OFFSET, 44);
        assert_eq!(PACKAGE_CHECKSUM_OFFSET, 56);
        assert_eq!(HeaderField::ModelOffset.offset(), 28);
    }

    #[test]
    fn test_header_field_placement() {
        let bytes = sample_header().to_bytes();
        assert_eq!(&bytes[0..4], b"N6M1");
        assert_eq!(&bytes[4..8], &[0x00, 0x01, 0x02, 0x00]);
        assert_eq!(read_u32_le(&bytes, HEADER_CHECKSUM_OFFSET), 0x1111_1111);
        assert_eq!(read_u32_le(&bytes, PACKAGE_CHECKSUM_OFFSET), 0x4444_4444);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let restored = PackageHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(restored, header);
    }

    #[test]
    fn test_header_truncated() {
        let bytes = [0u8; HEADER_SIZE - 1];
        let result = PackageHeader::from_bytes(&bytes);
        assert!(matches!(
            result,
            Err(PackError::Truncated {
                expected: HEADER_SIZE,
                actual: 59,
                ..
            })
        ));
    }

    #[test]
    fn test_header_invalid_magic() {
        let mut header = sample_header();
        header.magic = 0xBADC_0FFE;
        assert!(matches!(
            header.check_identity(),
            Err(PackError::InvalidMagic {
                actual: 0xBADC_0FFE,
                ..
            })
        ));
    }

    #[test]
    fn test_header_version_must_match_exactly() {
        let mut header = sample_header();
        header.version = 0x0002_0200;
        assert!(matches!(
            header.check_identity(),
            Err(PackError::UnsupportedVersion {
                actual: 0x0002_0200,
                ..
            })
        ));
    }

    #[test]
    fn test_header_checksum_ignores_checksum_fields() {
        let a = sample_header();
        let mut b = a;
        b.header_checksum = 0;
        b.model_checksum = 0;
        b.package_checksum = 0;
        assert_eq!(a.compute_header_checksum(), b.compute_header_checksum());

        b.model_size += 1;
        assert_ne!(a.compute_header_checksum(), b.compute_header_checksum());
    }

    #[test]
    fn test_version_string() {
        assert_eq!(sample_header().version_string(), "2.1.0");
    }

    #[test]
    fn test_section_out_of_bounds() {
        let section = sample_header().section(SectionKind::RelocatableModel);
        assert_eq!(section.range(2052).unwrap(), 1024..2052);

        let err = section.range(2051).unwrap_err();
        assert!(matches!(
            err,
            PackError::SectionOutOfBounds {
                section: "relocatable_model",
                ..
            }
        ));
    }

    #[test]
    fn test_section_end_does_not_overflow() {
        let section = Section {
            kind: SectionKind::Metadata,
            offset: u32::MAX,
            size: u32::MAX,
        };
        assert_eq!(section.end(), 2 * u64::from(u32::MAX));
        assert!(section.range(16).is_err());
    }

    #[test]
    fn test_metadata_json_sorted_keys() {
        let metadata = PackageMetadata {
            created_at: "2025-10-15T12:00:00.000000".to_string(),
            created_by: "test".to_string(),
            model_info: serde_json::json!({"name": "x"}),
            package_version: PACKAGE_VERSION_STRING.to_string(),
        };
        let json = String::from_utf8(metadata.to_json().unwrap()).unwrap();
        let at = json.find("created_at").unwrap();
        let by = json.find("created_by").unwrap();
        let info = json.find("model_info").unwrap();
        let version = json.find("package_version").unwrap();
        assert!(at < by && by < info && info < version);
        assert!(json.contains("\"package_version\": \"2.1.0\""));
    }
}
