//! Section placement for model packages.
//!
//! Sections are laid out back to back after the header, except the
//! relocatable model, which starts on the next [`MODEL_ALIGNMENT`] boundary.
//! The gap between the end of the config and the model is zero padding.

use crate::format::{Section, SectionKind, HEADER_SIZE, MODEL_ALIGNMENT};
use crate::{PackError, Result};

/// Planned offsets for every section of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionLayout {
    /// Metadata JSON, immediately after the header.
    pub metadata: Section,
    /// Model config JSON, immediately after the metadata.
    pub model_config: Section,
    /// Relocatable model, aligned.
    pub model: Section,
    /// Extension data, after the model. Always empty in format 2.1.
    pub extension: Section,
    /// Zero bytes between config end and model start.
    pub padding: u32,
    /// Total package length.
    pub package_size: u32,
}

impl SectionLayout {
    /// Plan a layout for the given section lengths.
    pub fn plan(metadata_len: usize, config_len: usize, model_len: usize) -> Result<Self> {
        let metadata_size = fit_u32("metadata", metadata_len)?;
        let config_size = fit_u32("model config", config_len)?;
        let model_size = fit_u32("relocatable model", model_len)?;

        let metadata_offset = HEADER_SIZE as u32;
        let config_offset = checked_add("metadata", metadata_offset, metadata_size)?;
        let config_end = checked_add("model config", config_offset, config_size)?;

        let model_offset = align_up(config_end, MODEL_ALIGNMENT).ok_or(PackError::TooLarge {
            what: "package",
            size: u64::from(config_end) + u64::from(MODEL_ALIGNMENT),
        })?;
        let model_end = checked_add("package", model_offset, model_size)?;

        let extension_size = 0;
        let package_size = checked_add("package", model_end, extension_size)?;

        Ok(Self {
            metadata: Section {
                kind: SectionKind::Metadata,
                offset: metadata_offset,
                size: metadata_size,
            },
            model_config: Section {
                kind: SectionKind::ModelConfig,
                offset: config_offset,
                size: config_size,
            },
            model: Section {
                kind: SectionKind::RelocatableModel,
                offset: model_offset,
                size: model_size,
            },
            extension: Section {
                kind: SectionKind::Extension,
                offset: model_end,
                size: extension_size,
            },
            padding: model_offset - config_end,
            package_size,
        })
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
pub fn align_up(value: u32, align: u32) -> Option<u32> {
    debug_assert!(align.is_power_of_two());
    Some(value.checked_add(align - 1)? & !(align - 1))
}

fn fit_u32(what: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| PackError::TooLarge {
        what,
        size: len as u64,
    })
}

fn checked_add(what: &'static str, a: u32, b: u32) -> Result<u32> {
    a.checked_add(b).ok_or(PackError::TooLarge {
        what,
        size: u64::from(a) + u64::from(b),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 1024), Some(0));
        assert_eq!(align_up(1, 1024), Some(1024));
        assert_eq!(align_up(1024, 1024), Some(1024));
        assert_eq!(align_up(1025, 1024), Some(2048));
        assert_eq!(align_up(u32::MAX, 1024), None);
    }

    #[test]
    fn test_sections_are_contiguous() {
        let layout = SectionLayout::plan(200, 100, 4).unwrap();
        assert_eq!(layout.metadata.offset, 60);
        assert_eq!(layout.model_config.offset, 260);
        assert_eq!(layout.model.offset, 1024);
        assert_eq!(layout.padding, 1024 - 360);
        assert_eq!(layout.extension.offset, 1028);
        assert_eq!(layout.extension.size, 0);
        assert_eq!(layout.package_size, 1028);
    }

    #[test]
    fn test_exact_boundary_has_no_padding() {
        // 60 + 900 + 64 = 1024
        let layout = SectionLayout::plan(900, 64, 16).unwrap();
        assert_eq!(layout.model.offset, 1024);
        assert_eq!(layout.padding, 0);
        assert_eq!(layout.package_size, 1040);
    }

    #[test]
    fn test_alignment_invariant_across_sizes() {
        for metadata_len in [0usize, 1, 163, 964, 965, 1023, 2000, 4096] {
            for config_len in [0usize, 1, 60, 1024, 3000] {
                let layout = SectionLayout::plan(metadata_len, config_len, 8).unwrap();
                let config_end = u64::from(layout.metadata.offset) + u64::from(layout.metadata.size);
                let config_end = config_end + u64::from(layout.model_config.size);
                assert_eq!(layout.model.offset % MODEL_ALIGNMENT, 0);
                assert!(u64::from(layout.model.offset) >= config_end);
                assert!(u64::from(layout.model.offset) - config_end < u64::from(MODEL_ALIGNMENT));
            }
        }
    }

    #[test]
    fn test_oversized_package_rejected() {
        let result = SectionLayout::plan(16, 16, u32::MAX as usize);
        assert!(matches!(result, Err(PackError::TooLarge { .. })));
    }
}
