//! OTA image commands.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use n6pack::format::ota::{
    compress, encrypt, pack_firmware, verify_ota_file, FirmwareType, FirmwareVersion,
    OtaImageOptions, OtaReport, OTA_HEADER_SIZE,
};
use n6pack::{Error, PackConfig};
use tracing::{debug, warn};

use super::{confirm, print_banner, thousands};

/// Pack, verify and clean OTA images
#[derive(Subcommand, Debug)]
pub enum OtaCmd {
    /// Prefix a firmware binary with an OTA header
    Pack(PackCmd),

    /// Check an OTA image's header and firmware digests
    Verify(VerifyCmd),

    /// Remove generated OTA images from a directory
    Clean(CleanCmd),
}

impl OtaCmd {
    pub fn run(self, config: &PackConfig) -> n6pack::Result<()> {
        match self {
            OtaCmd::Pack(cmd) => cmd.run(config),
            OtaCmd::Verify(cmd) => cmd.run(),
            OtaCmd::Clean(cmd) => cmd.run(config),
        }
    }
}

/// Build an OTA image.
///
/// Examples:
///   n6pack ota pack app.bin -o app_ota.bin -n app -d "main application" -t app -v 1.0.0.1
///   n6pack ota pack model.bin -o model_ota.bin -n yolo -d "detector" -t ai_model -v 2.0.0.0
#[derive(Args, Debug)]
pub struct PackCmd {
    /// Firmware binary to pack
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output OTA image path
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: PathBuf,

    /// Firmware name (at most 31 bytes are kept)
    #[arg(short = 'n', long)]
    pub name: String,

    /// Firmware description (at most 63 bytes are kept)
    #[arg(short = 'd', long = "desc")]
    pub description: String,

    /// Firmware type: fsbl, app, web, ai_model, config, patch or full
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub fw_type: FirmwareType,

    /// Firmware version, major.minor.patch.build
    #[arg(short = 'v', long, value_name = "A.B.C.D")]
    pub version: FirmwareVersion,

    /// Minimum version able to install this image (defaults to --version)
    #[arg(long, value_name = "A.B.C.D")]
    pub min_version: Option<FirmwareVersion>,

    /// Sequence number written into the header
    #[arg(long, value_name = "N")]
    pub sequence: Option<u32>,

    /// Creation time as Unix seconds (defaults to now)
    #[arg(long, value_name = "SECS")]
    pub timestamp: Option<u32>,
}

impl PackCmd {
    pub fn run(self, config: &PackConfig) -> n6pack::Result<()> {
        let mut options =
            OtaImageOptions::new(self.name, self.description, self.fw_type, self.version);
        options.min_version = self.min_version;
        options.sequence = config.ota_sequence(self.sequence);
        options.timestamp = self.timestamp;

        let fw_size = fs::metadata(&self.input)?.len();
        println!(
            "Reading firmware file: {} ({} bytes)",
            self.input.display(),
            fw_size
        );

        let total = pack_firmware(&self.input, &self.output, &options)?;

        println!(
            "Generated OTA firmware package: {} ({} bytes)",
            self.output.display(),
            total
        );
        println!("  - Header: {} bytes", OTA_HEADER_SIZE);
        println!("  - Firmware data: {} bytes", fw_size);
        println!("Firmware information:");
        println!("  Name: {}", options.name);
        println!("  Description: {}", options.description);
        println!(
            "  Type: {} ({})",
            options.fw_type.tag(),
            options.fw_type as u8
        );
        println!("  Version: {}", options.version);
        println!("  Output file: {}", self.output.display());
        Ok(())
    }
}

/// Verify an OTA image.
///
/// Every check runs even when an earlier one fails. Exits non-zero if any
/// check failed.
#[derive(Args, Debug)]
pub struct VerifyCmd {
    /// OTA image to verify
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

impl VerifyCmd {
    pub fn run(self) -> n6pack::Result<()> {
        let report = verify_ota_file(&self.file)?;

        print_banner("OTA Package Verification");
        for check in &report.checks {
            if check.passed {
                println!("[PASS] {}: {}", check.kind.label(), check.actual);
            } else {
                println!(
                    "[FAIL] {}: {} (expected: {})",
                    check.kind.label(),
                    check.actual,
                    check.expected
                );
            }
        }

        println!();
        print_banner("Package Information");
        print_package_info(&report);
        println!();

        let failed = report.checks.iter().filter(|c| !c.passed).count();
        if failed > 0 {
            print_banner("[FAILURE] OTA Package Verification FAILED");
            return Err(Error::VerificationFailed(format!(
                "{}: {} of {} checks failed",
                self.file.display(),
                failed,
                report.checks.len()
            )));
        }

        print_banner("[SUCCESS] OTA Package Verification PASSED");
        Ok(())
    }
}

fn print_package_info(report: &OtaReport) {
    let header = &report.header;
    let fw_type = match header.firmware_type() {
        Some(fw_type) => fw_type.display_name().to_string(),
        None => format!("Unknown ({:#04X})", header.fw_type),
    };

    println!("Firmware Type:        {}", fw_type);
    println!("Firmware Name:        {}", header.name);
    println!("Description:          {}", header.description);
    println!("Version:              {}", header.fw_version);
    println!("Min Compatible Ver:   {}", header.min_version);
    println!("Timestamp:            {}", format_timestamp(header.timestamp));
    println!("Sequence:             {}", header.sequence);
    println!(
        "Firmware Size:        {} bytes",
        thousands(header.fw_size.into())
    );
    println!(
        "Total Package Size:   {} bytes",
        thousands(header.total_package_size.into())
    );
    println!(
        "Encryption:           {}",
        tag_name(header.encrypt_type, encrypt::NONE)
    );
    println!(
        "Compression:          {}",
        tag_name(header.compress_type, compress::NONE)
    );
}

fn tag_name(tag: u8, none: u8) -> String {
    if tag == none {
        "None".to_string()
    } else {
        format!("Type {}", tag)
    }
}

/// Render Unix seconds as local `YYYY-MM-DD HH:MM:SS`.
fn format_timestamp(secs: u32) -> String {
    chrono::DateTime::from_timestamp(i64::from(secs), 0)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| secs.to_string())
}

/// Remove generated OTA images.
///
/// Only regular files directly inside the directory whose names end with
/// the suffix are removed.
#[derive(Args, Debug)]
pub struct CleanCmd {
    /// Directory to clean
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// File name suffix to match (default: _ota.bin)
    #[arg(long, value_name = "SUFFIX")]
    pub suffix: Option<String>,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,
}

impl CleanCmd {
    pub fn run(self, config: &PackConfig) -> n6pack::Result<()> {
        let suffix = config.clean_suffix(self.suffix);
        let images = find_images(&self.dir, &suffix)?;

        if images.is_empty() {
            println!("No OTA package files found to clean.");
            return Ok(());
        }

        println!("Found {} OTA package file(s) to remove:", images.len());
        for image in &images {
            println!("  - {}", image.display());
        }
        println!();

        if self.force {
            println!("Force mode: Skipping confirmation...");
        } else if !confirm("Are you sure you want to delete these files?") {
            println!("Clean operation cancelled.");
            return Ok(());
        }

        let mut removed = 0;
        let mut failed = 0;
        for image in &images {
            match fs::remove_file(image) {
                Ok(()) => {
                    println!("  Removed: {}", image.display());
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %image.display(), error = %e, "failed to remove OTA image");
                    println!("  Failed to remove {}: {}", image.display(), e);
                    failed += 1;
                }
            }
        }

        println!();
        println!("Clean completed: {} removed, {} failed", removed, failed);
        if failed > 0 {
            return Err(Error::VerificationFailed(format!(
                "{} file(s) could not be removed",
                failed
            )));
        }
        Ok(())
    }
}

/// Regular files in `dir` whose names end with `suffix`, sorted by path.
fn find_images(dir: &Path, suffix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(suffix) {
            images.push(entry.path());
        }
    }
    images.sort();
    debug!(dir = %dir.display(), suffix, count = images.len(), "found OTA images");
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_images_matches_suffix_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("b_ota.bin"), b"x").unwrap();
        fs::write(dir.join("a_ota.bin"), b"x").unwrap();
        fs::write(dir.join("app.bin"), b"x").unwrap();
        fs::create_dir(dir.join("nested_ota.bin")).unwrap();

        let images = find_images(dir, "_ota.bin").unwrap();
        assert_eq!(images, vec![dir.join("a_ota.bin"), dir.join("b_ota.bin")]);
    }

    #[test]
    fn test_clean_force_removes_images() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("app_ota.bin"), b"x").unwrap();
        fs::write(dir.join("keep.bin"), b"x").unwrap();

        let cmd = CleanCmd {
            dir: dir.to_path_buf(),
            suffix: None,
            force: true,
        };
        cmd.run(&PackConfig::default()).unwrap();

        assert!(!dir.join("app_ota.bin").exists());
        assert!(dir.join("keep.bin").exists());
    }

    #[test]
    fn test_tag_name() {
        assert_eq!(tag_name(encrypt::NONE, encrypt::NONE), "None");
        assert_eq!(tag_name(2, encrypt::NONE), "Type 2");
    }

    #[test]
    fn test_pack_then_verify_command() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("app.bin");
        let output = temp_dir.path().join("app_ota.bin");
        fs::write(&input, vec![0xA5u8; 3000]).unwrap();

        let pack = PackCmd {
            input,
            output: output.clone(),
            name: "app".to_string(),
            description: "main application".to_string(),
            fw_type: FirmwareType::App,
            version: "1.2.3.4".parse().unwrap(),
            min_version: None,
            sequence: None,
            timestamp: Some(1_700_000_000),
        };
        pack.run(&PackConfig::default()).unwrap();

        VerifyCmd { file: output.clone() }.run().unwrap();

        let mut bytes = fs::read(&output).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&output, bytes).unwrap();
        let err = VerifyCmd { file: output }.run().unwrap_err();
        assert!(matches!(err, Error::VerificationFailed(_)));
    }
}
