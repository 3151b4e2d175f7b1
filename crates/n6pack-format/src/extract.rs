//! Package extraction.
//!
//! Splits a package back into its standalone sections plus a manifest
//! describing the header. Checksums are not verified here; callers that need
//! integrity guarantees run [`crate::validate`] as well.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::format::{PackageHeader, Section, SectionKind, PACKAGE_FORMAT_NAME};
use crate::Result;

/// File name of the manifest written next to extracted sections.
pub const MANIFEST_FILE_NAME: &str = "package_info.json";

/// Sections split out of a package. Empty sections are `None`.
#[derive(Debug, Clone)]
pub struct ExtractedPackage {
    /// Decoded header.
    pub header: PackageHeader,
    /// Raw metadata JSON.
    pub metadata_json: Option<Vec<u8>>,
    /// Raw model config JSON, byte-identical to the builder input.
    pub config_json: Option<Vec<u8>>,
    /// Relocatable model, byte-identical to the builder input.
    pub model: Option<Vec<u8>>,
    /// Manifest describing the header.
    pub manifest: ExtractionManifest,
}

impl ExtractedPackage {
    /// Bytes of a section, if it was non-empty.
    pub fn section_bytes(&self, kind: SectionKind) -> Option<&[u8]> {
        match kind {
            SectionKind::Metadata => self.metadata_json.as_deref(),
            SectionKind::ModelConfig => self.config_json.as_deref(),
            SectionKind::RelocatableModel => self.model.as_deref(),
            SectionKind::Extension => None,
        }
    }
}

/// Manifest describing an extracted package (`package_info.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionManifest {
    /// Format name.
    pub package_format: String,
    /// Magic as a hex string (`0x314D364E`).
    pub magic: String,
    /// Version as a dotted string (`2.1.0`).
    pub version: String,
    /// Total package length.
    pub package_size: u32,
    /// Offset and size of every section.
    pub sections: ManifestSections,
    /// Every checksum field as a hex string.
    pub checksums: ManifestChecksums,
}

/// Section table of an [`ExtractionManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSections {
    /// Metadata section.
    pub metadata: SectionEntry,
    /// Model config section.
    pub model_config: SectionEntry,
    /// Relocatable model section.
    pub relocatable_model: SectionEntry,
    /// Extension section.
    pub extension_data: SectionEntry,
}

/// Location of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    /// Byte offset.
    pub offset: u32,
    /// Length in bytes.
    pub size: u32,
}

impl From<Section> for SectionEntry {
    fn from(section: Section) -> Self {
        Self {
            offset: section.offset,
            size: section.size,
        }
    }
}

/// Checksum table of an [`ExtractionManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChecksums {
    /// Header checksum.
    pub header: String,
    /// Model checksum.
    pub model: String,
    /// Config checksum.
    pub config: String,
    /// Package checksum.
    pub package: String,
}

fn hex32(value: u32) -> String {
    format!("{:#010X}", value)
}

impl ExtractionManifest {
    /// Describe `header`.
    pub fn from_header(header: &PackageHeader) -> Self {
        Self {
            package_format: PACKAGE_FORMAT_NAME.to_string(),
            magic: hex32(header.magic),
            version: header.version_string(),
            package_size: header.package_size,
            sections: ManifestSections {
                metadata: header.section(SectionKind::Metadata).into(),
                model_config: header.section(SectionKind::ModelConfig).into(),
                relocatable_model: header.section(SectionKind::RelocatableModel).into(),
                extension_data: header.section(SectionKind::Extension).into(),
            },
            checksums: ManifestChecksums {
                header: hex32(header.header_checksum),
                model: hex32(header.model_checksum),
                config: hex32(header.config_checksum),
                package: hex32(header.package_checksum),
            },
        }
    }

    /// Serialize manifest to pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize manifest from JSON.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

fn read_section(
    data: &[u8],
    header: &PackageHeader,
    kind: SectionKind,
) -> Result<Option<Vec<u8>>> {
    let section = header.section(kind);
    if section.is_empty() {
        return Ok(None);
    }
    Ok(Some(section.slice(data)?.to_vec()))
}

/// Split a package held in memory into its sections.
///
/// Magic and version are checked; checksums are not.
pub fn extract(data: &[u8]) -> Result<ExtractedPackage> {
    let header = PackageHeader::from_bytes(data)?;
    header.check_identity()?;

    Ok(ExtractedPackage {
        metadata_json: read_section(data, &header, SectionKind::Metadata)?,
        config_json: read_section(data, &header, SectionKind::ModelConfig)?,
        model: read_section(data, &header, SectionKind::RelocatableModel)?,
        manifest: ExtractionManifest::from_header(&header),
        header,
    })
}

/// A file written by [`extract_package`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Path of the written file.
    pub path: PathBuf,
    /// Number of bytes written.
    pub size: u64,
}

/// Extract a package file into `output_dir`.
///
/// Writes one file per non-empty section plus [`MANIFEST_FILE_NAME`], which
/// is always produced.
pub fn extract_package(
    package_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
) -> Result<Vec<ExtractedFile>> {
    let package_path = package_path.as_ref();
    let output_dir = output_dir.as_ref();

    let data = fs::read(package_path)?;
    let extracted = extract(&data)?;
    fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    for kind in SectionKind::ALL {
        let (Some(file_name), Some(bytes)) = (kind.file_name(), extracted.section_bytes(kind))
        else {
            debug!(section = kind.name(), "skipping empty section");
            continue;
        };
        written.push(write_file(&output_dir.join(file_name), bytes)?);
    }

    let manifest = extracted.manifest.to_json()?;
    written.push(write_file(&output_dir.join(MANIFEST_FILE_NAME), &manifest)?);

    info!(
        package = %package_path.display(),
        output = %output_dir.display(),
        files = written.len(),
        "package extracted"
    );
    Ok(written)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<ExtractedFile> {
    fs::write(path, bytes)?;
    debug!(path = %path.display(), size = bytes.len(), "wrote section");
    Ok(ExtractedFile {
        path: path.to_path_buf(),
        size: bytes.len() as u64,
    })
}
