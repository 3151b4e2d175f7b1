//! n6pack - STM32N6 model package and OTA image tooling
//!
//! The container codec lives in the `n6pack-format` crate. This crate adds
//! the pieces the command-line tool needs around it:
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  n6pack CLI (model / ota / version-header)      │
//! ├─────────────────────────────────────────────────┤
//! │  config (TOML)  ·  version_header  ·  error     │
//! ├─────────────────────────────────────────────────┤
//! │  n6pack-format (package + OTA codecs)           │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use n6pack::format::PackageBuilder;
//!
//! let model = std::fs::read("network_rel.bin")?;
//! let config = std::fs::read("model_config.json")?;
//! let package = PackageBuilder::new().write(&model, &config, "model_package.bin")?;
//! println!("package checksum: {:#010x}", package.header.package_checksum);
//! # Ok::<(), n6pack::Error>(())
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod version_header;

pub use config::PackConfig;
pub use error::{Error, Result};
pub use n6pack_format as format;

/// n6pack version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
