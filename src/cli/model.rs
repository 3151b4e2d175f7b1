//! Model package commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use n6pack::format::{create_package, extract_package, validate_file, PackageBuilder};
use n6pack::PackConfig;
use tracing::info;

use super::{format_size_mb, thousands};

/// Create, extract and validate model packages
#[derive(Subcommand, Debug)]
pub enum ModelCmd {
    /// Bundle a relocatable model and its configuration into a package
    Create(CreateCmd),

    /// Unpack a package into its sections and a manifest
    Extract(ExtractCmd),

    /// Check a package's structure and checksums
    Validate(ValidateCmd),
}

impl ModelCmd {
    pub fn run(self, config: &PackConfig) -> n6pack::Result<()> {
        match self {
            ModelCmd::Create(cmd) => cmd.run(config),
            ModelCmd::Extract(cmd) => cmd.run(),
            ModelCmd::Validate(cmd) => cmd.run(),
        }
    }
}

/// Create a model package.
///
/// Examples:
///   n6pack model create --model network_rel.bin --config model.json --output model.bin
#[derive(Args, Debug)]
pub struct CreateCmd {
    /// Relocatable model (network_rel.bin)
    #[arg(long, value_name = "PATH")]
    pub model: PathBuf,

    /// Model configuration JSON
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Output package path
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,

    /// Creator identity recorded in the package metadata
    #[arg(long, value_name = "NAME")]
    pub created_by: Option<String>,
}

impl CreateCmd {
    pub fn run(self, config: &PackConfig) -> n6pack::Result<()> {
        let mut builder = PackageBuilder::new();
        if let Some(creator) = self.created_by.or_else(|| config.created_by.clone()) {
            builder = builder.with_creator(creator);
        }

        info!(
            model = %self.model.display(),
            output = %self.output.display(),
            "creating package"
        );
        let package = create_package(&builder, &self.model, &self.config, &self.output)?;
        let header = &package.header;

        println!("[OK] Package created successfully: {}", self.output.display());
        println!("  Config: {}", self.config.display());
        println!("  Total size: {}", format_size_mb(header.package_size.into()));
        println!(
            "  Model size: {}",
            format_size_mb(header.model_size.into())
        );
        println!(
            "  Config size: {} bytes",
            thousands(header.model_config_size.into())
        );
        println!("  Header checksum: {:#010X}", header.header_checksum);
        println!("  Model checksum: {:#010X}", header.model_checksum);
        println!("  Config checksum: {:#010X}", header.config_checksum);
        println!("  Package checksum: {:#010X}", header.package_checksum);
        Ok(())
    }
}

/// Extract a model package.
///
/// Writes metadata.json, model_config.json and network_rel.bin for each
/// non-empty section, plus package_info.json describing the header.
#[derive(Args, Debug)]
pub struct ExtractCmd {
    /// Package to extract
    #[arg(long, value_name = "PATH")]
    pub package: PathBuf,

    /// Output directory
    #[arg(long, value_name = "DIR")]
    pub output: PathBuf,
}

impl ExtractCmd {
    pub fn run(self) -> n6pack::Result<()> {
        let files = extract_package(&self.package, &self.output)?;

        println!("[OK] Package extracted to: {}", self.output.display());
        println!("  Files created:");
        for file in &files {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.path.display().to_string());
            println!("    {}: {} bytes", name, thousands(file.size));
        }
        Ok(())
    }
}

/// Validate a model package.
#[derive(Args, Debug)]
pub struct ValidateCmd {
    /// Package to validate
    #[arg(long, value_name = "PATH")]
    pub package: PathBuf,
}

impl ValidateCmd {
    pub fn run(self) -> n6pack::Result<()> {
        let validated = validate_file(&self.package)?;
        let header = &validated.header;

        println!("[OK] Valid package: {}", self.package.display());
        println!("  Version: {}", header.version_string());
        println!(
            "  Model: {}",
            validated.model_info_str("name").unwrap_or("Unknown")
        );
        println!(
            "  Framework: {}",
            validated.model_info_str("framework").unwrap_or("Unknown")
        );
        println!("  Size: {}", format_size_mb(header.package_size.into()));
        println!(
            "  Model size: {}",
            format_size_mb(header.model_size.into())
        );
        println!(
            "  Config size: {} bytes",
            thousands(header.model_config_size.into())
        );
        Ok(())
    }
}
