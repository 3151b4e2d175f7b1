//! Package builder for assembling model packages.
//!
//! This module combines the header, generated metadata, model config and
//! relocatable model into a single container. The package checksum covers
//! every other byte of the file, so it is computed last over the fully
//! assembled buffer and patched into place before anything touches disk.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use crate::checksum::{crc32, crc32_excluding, CHECKSUM_FIELD_SIZE};
use crate::format::{
    read_u32_le, PackageHeader, PackageMetadata, PACKAGE_CHECKSUM_OFFSET, PACKAGE_MAGIC,
    PACKAGE_VERSION, PACKAGE_VERSION_STRING, RELOCATABLE_MODEL_MAGIC,
};
use crate::layout::SectionLayout;
use crate::{PackError, Result};

/// Creator identity recorded in metadata unless overridden.
pub const DEFAULT_CREATOR: &str = "STM32N6 Model Packager v2.1";

/// Top-level keys every model config must carry.
pub const REQUIRED_CONFIG_KEYS: [&str; 3] = ["model_info", "input_spec", "output_spec"];

/// Builder for model packages.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    created_by: String,
    created_at: Option<String>,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBuilder {
    /// Create a builder with the default creator and a wall-clock timestamp.
    pub fn new() -> Self {
        Self {
            created_by: DEFAULT_CREATOR.to_string(),
            created_at: None,
        }
    }

    /// Set the creator identity written into metadata.
    pub fn with_creator(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Pin the metadata timestamp instead of using the current local time.
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

    /// Assemble a package in memory.
    ///
    /// Inputs are checked before anything is assembled; a rejected model or
    /// config never yields bytes.
    pub fn build(&self, model: &[u8], config: &[u8]) -> Result<BuiltPackage> {
        check_relocatable_model(model)?;
        let model_info = parse_model_config(config)?;

        let metadata = PackageMetadata {
            created_at: self.created_at.clone().unwrap_or_else(now_iso8601),
            created_by: self.created_by.clone(),
            model_info,
            package_version: PACKAGE_VERSION_STRING.to_string(),
        }
        .to_json()?;

        let layout = SectionLayout::plan(metadata.len(), config.len(), model.len())?;
        debug!(
            metadata_size = layout.metadata.size,
            config_size = layout.model_config.size,
            model_offset = layout.model.offset,
            padding = layout.padding,
            package_size = layout.package_size,
            "planned package layout"
        );

        let mut header = PackageHeader {
            magic: PACKAGE_MAGIC,
            version: PACKAGE_VERSION,
            package_size: layout.package_size,
            metadata_offset: layout.metadata.offset,
            metadata_size: layout.metadata.size,
            model_config_offset: layout.model_config.offset,
            model_config_size: layout.model_config.size,
            model_offset: layout.model.offset,
            model_size: layout.model.size,
            extension_offset: layout.extension.offset,
            extension_size: layout.extension.size,
            header_checksum: 0,
            model_checksum: crc32(model),
            config_checksum: crc32(config),
            package_checksum: 0,
        };
        header.header_checksum = header.compute_header_checksum();

        let mut bytes = Vec::with_capacity(layout.package_size as usize);
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(&metadata);
        bytes.extend_from_slice(config);
        bytes.resize(layout.model.offset as usize, 0);
        bytes.extend_from_slice(model);
        debug_assert_eq!(bytes.len(), layout.package_size as usize);

        // Every other field is final; the package checksum goes in last.
        header.package_checksum = crc32_excluding(&bytes, PACKAGE_CHECKSUM_OFFSET);
        bytes[PACKAGE_CHECKSUM_OFFSET..PACKAGE_CHECKSUM_OFFSET + CHECKSUM_FIELD_SIZE]
            .copy_from_slice(&header.package_checksum.to_le_bytes());

        debug!(
            header_checksum = format_args!("{:#010x}", header.header_checksum),
            model_checksum = format_args!("{:#010x}", header.model_checksum),
            config_checksum = format_args!("{:#010x}", header.config_checksum),
            package_checksum = format_args!("{:#010x}", header.package_checksum),
            "finalized package checksums"
        );

        Ok(BuiltPackage {
            header,
            layout,
            bytes,
        })
    }

    /// Build a package and write it to `output`.
    ///
    /// The file only appears at `output` once it is complete.
    pub fn write(
        &self,
        model: &[u8],
        config: &[u8],
        output: impl AsRef<Path>,
    ) -> Result<BuiltPackage> {
        let output = output.as_ref();
        let package = self.build(model, config)?;
        write_atomic(output, &[&package.bytes])?;
        info!(
            path = %output.display(),
            size = package.header.package_size,
            "package written"
        );
        Ok(package)
    }
}

/// A fully assembled package.
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    /// Final header, including all checksums.
    pub header: PackageHeader,
    /// Section placement used.
    pub layout: SectionLayout,
    /// Complete container bytes.
    pub bytes: Vec<u8>,
}

impl BuiltPackage {
    /// Consume the package, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Read a model and config from disk and write a package to `output`.
pub fn create_package(
    builder: &PackageBuilder,
    model_path: impl AsRef<Path>,
    config_path: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<BuiltPackage> {
    let model = fs::read(model_path.as_ref())?;
    let config = fs::read(config_path.as_ref())?;
    debug!(
        model = %model_path.as_ref().display(),
        model_size = model.len(),
        config = %config_path.as_ref().display(),
        config_size = config.len(),
        "loaded package inputs"
    );
    builder.write(&model, &config, output)
}

/// Check that `model` starts with the relocatable model magic.
pub fn check_relocatable_model(model: &[u8]) -> Result<()> {
    if model.len() < 4 {
        return Err(PackError::Truncated {
            what: "relocatable model",
            expected: 4,
            actual: model.len(),
        });
    }
    let magic = read_u32_le(model, 0);
    if magic != RELOCATABLE_MODEL_MAGIC {
        return Err(PackError::InvalidModelMagic {
            expected: RELOCATABLE_MODEL_MAGIC,
            actual: magic,
        });
    }
    Ok(())
}

/// Parse a model config and return its `model_info` object.
pub fn parse_model_config(config: &[u8]) -> Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_slice(config)
        .map_err(|e| PackError::InvalidConfig(e.to_string()))?;
    let mut object = match value {
        serde_json::Value::Object(object) => object,
        other => {
            return Err(PackError::InvalidConfig(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            )))
        }
    };

    for key in REQUIRED_CONFIG_KEYS {
        if !object.contains_key(key) {
            return Err(PackError::MissingConfigKey(key));
        }
    }

    Ok(object
        .remove(REQUIRED_CONFIG_KEYS[0])
        .unwrap_or(serde_json::Value::Null))
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn now_iso8601() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Write `parts` to a temporary file next to `path`, then rename it into place.
pub(crate) fn write_atomic(path: &Path, parts: &[&[u8]]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    for part in parts {
        temp.write_all(part)?;
    }
    temp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o644))?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{builder, SAMPLE_CONFIG};
    use crate::format::HEADER_SIZE;

    #[test]
    fn test_build_minimal_package() {
        let package = builder().build(b"NBIN", SAMPLE_CONFIG).unwrap();
        let header = package.header;

        assert_eq!(header.model_size, 4);
        let config_end = HEADER_SIZE as u32 + header.metadata_size + header.model_config_size;
        assert_eq!(header.model_offset % 1024, 0);
        assert!(header.model_offset >= config_end);
        assert!(header.model_offset - config_end < 1024);
        assert_eq!(header.package_size, header.model_offset + 4);
        assert_eq!(package.bytes.len(), header.package_size as usize);
        assert_eq!(header.model_config_size as usize, SAMPLE_CONFIG.len());
    }

    #[test]
    fn test_build_stores_checksums() {
        let model = b"NBIN\x01\x02\x03\x04\x05";
        let package = builder().build(model, SAMPLE_CONFIG).unwrap();
        let header = PackageHeader::from_bytes(&package.bytes).unwrap();

        assert_eq!(header, package.header);
        assert_eq!(header.model_checksum, crc32(model));
        assert_eq!(header.config_checksum, crc32(SAMPLE_CONFIG));
        assert_eq!(header.header_checksum, header.compute_header_checksum());
        assert_eq!(
            header.package_checksum,
            crc32_excluding(&package.bytes, PACKAGE_CHECKSUM_OFFSET)
        );
        assert_ne!(header.package_checksum, 0);
    }

    #[test]
    fn test_build_pads_with_zeros() {
        let package = builder().build(b"NBIN", SAMPLE_CONFIG).unwrap();
        let layout = package.layout;
        let pad_start = layout.model_config.end() as usize;
        let pad_end = layout.model.offset as usize;
        assert!(package.bytes[pad_start..pad_end].iter().all(|&b| b == 0));
        assert_eq!(&package.bytes[pad_end..], b"NBIN");
    }

    #[test]
    fn test_build_metadata_contents() {
        let package = builder()
            .with_creator("unit test")
            .build(b"NBIN", SAMPLE_CONFIG)
            .unwrap();
        let range = package.layout.metadata.range(package.bytes.len()).unwrap();
        let metadata = PackageMetadata::from_json(&package.bytes[range]).unwrap();

        assert_eq!(metadata.created_at, "2025-10-15T12:00:00.000000");
        assert_eq!(metadata.created_by, "unit test");
        assert_eq!(metadata.package_version, "2.1.0");
        assert_eq!(metadata.model_info["name"], "x");
    }

    #[test]
    fn test_build_is_deterministic_with_pinned_timestamp() {
        let a = builder().build(b"NBIN1234", SAMPLE_CONFIG).unwrap();
        let b = builder().build(b"NBIN1234", SAMPLE_CONFIG).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_reject_bad_model_magic() {
        let result = builder().build(b"ELF\x7f", SAMPLE_CONFIG);
        assert!(matches!(
            result,
            Err(PackError::InvalidModelMagic {
                expected: RELOCATABLE_MODEL_MAGIC,
                ..
            })
        ));
    }

    #[test]
    fn test_reject_short_model() {
        let result = builder().build(b"NB", SAMPLE_CONFIG);
        assert!(matches!(result, Err(PackError::Truncated { actual: 2, .. })));
    }

    #[test]
    fn test_reject_missing_config_key() {
        let config = br#"{"model_info":{},"input_spec":{}}"#;
        let result = builder().build(b"NBIN", config);
        assert!(matches!(result, Err(PackError::MissingConfigKey("output_spec"))));
    }

    #[test]
    fn test_reject_non_object_config() {
        assert!(matches!(
            parse_model_config(b"[1, 2]"),
            Err(PackError::InvalidConfig(_))
        ));
        assert!(matches!(
            parse_model_config(b"not json"),
            Err(PackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_write_creates_complete_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output = temp_dir.path().join("model.bin");

        let package = builder().write(b"NBIN", SAMPLE_CONFIG, &output).unwrap();
        assert_eq!(fs::read(&output).unwrap(), package.bytes);

        // No temporary files left behind.
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_failed_build_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output = temp_dir.path().join("model.bin");

        let result = builder().write(b"NBIN", br#"{"model_info":{}}"#, &output);
        assert!(result.is_err());
        assert!(!output.exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_create_package_from_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model_path = temp_dir.path().join("network_rel.bin");
        let config_path = temp_dir.path().join("model_config.json");
        let output = temp_dir.path().join("out").join("model.bin");
        fs::write(&model_path, b"NBINpayload").unwrap();
        fs::write(&config_path, SAMPLE_CONFIG).unwrap();
        fs::create_dir_all(output.parent().unwrap()).unwrap();

        let package = create_package(&builder(), &model_path, &config_path, &output).unwrap();
        assert_eq!(package.header.model_size, 11);
        assert!(output.exists());
    }

    #[test]
    fn test_create_package_missing_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = create_package(
            &builder(),
            temp_dir.path().join("missing.bin"),
            temp_dir.path().join("missing.json"),
            temp_dir.path().join("model.bin"),
        );
        assert!(matches!(result, Err(PackError::Io(_))));
    }
}
